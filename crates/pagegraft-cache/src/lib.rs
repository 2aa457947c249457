//! Page cache for server-rendered pages.
//!
//! This crate provides:
//! - `PageCache` - page key to `PageState` map with deferred-aware saves and grafts
//! - `FragmentIndex` - fragment name to `(page, path)` index and fragment extraction
//! - `CacheError` - errors raised by cache mutations
//!
//! # Example
//!
//! ```ignore
//! use pagegraft_cache::{FragmentIndex, PageCache};
//! use pagegraft_core::{PageKey, PageResponse};
//! use serde_json::json;
//!
//! let mut cache = PageCache::new();
//! cache.save(PageKey::new("/foo"), PageResponse::new(json!({"a": {"b": {"c": {}}}})));
//!
//! let graft = PageResponse::graft("a.b.c", json!({"foo": 1}));
//! cache.graft(&PageKey::new("/foo"), &graft)?;
//! cache.broadcast(&FragmentIndex::extract(&graft));
//! ```

mod error;
mod fragment;
mod store;

pub use error::*;
pub use fragment::*;
pub use store::*;
