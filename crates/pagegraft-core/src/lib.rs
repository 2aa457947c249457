//! Core types for the pagegraft page cache.
//!
//! This crate provides:
//! - `KeyPath` and the `path` module - dot-path reads and writes on JSON trees
//! - `PageResponse` / `PageState` - inbound payloads and cached page records
//! - `PageKey` / `KeyNormalizer` - URL to cache key normalization
//! - `EngineConfig` - engine configuration loaded from TOML or JSON
//!
//! # Example
//!
//! ```ignore
//! use pagegraft_core::{path, KeyNormalizer, KeyPath};
//! use serde_json::json;
//!
//! let key = KeyNormalizer::default().page_key("/products?__=7&bzq=header");
//! assert_eq!(key.as_str(), "/products");
//!
//! let mut tree = json!({"header": {"cart": {}}});
//! path::write(&mut tree, &KeyPath::new("header.cart"), json!({"total": 3}));
//! ```

mod config;
mod key;
mod page;
pub mod path;

pub use config::*;
pub use key::*;
pub use page::*;
pub use path::KeyPath;
