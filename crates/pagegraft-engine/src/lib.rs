//! Ingestion pipeline for the pagegraft page cache.
//!
//! This crate provides:
//! - `IngestionPipeline` - save-or-graft, fragment broadcast and deferral resolution
//!   for every inbound page, plus the `remote` and `visit` entry points
//! - `DeferralResolver` - concurrent follow-up fetches for `auto` deferments
//! - `VisitSequencer` - decides whether a finished visit is still the latest one
//! - `Navigator` - history integration and component lookup for cached pages
//! - `Notice` - structured notifications published on a broadcast channel
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pagegraft_core::EngineConfig;
//! use pagegraft_engine::{IngestionPipeline, VisitOptions};
//!
//! let pipeline = IngestionPipeline::new(Arc::new(transport), EngineConfig::default());
//! let mut notices = pipeline.subscribe();
//!
//! let meta = pipeline.visit("/products?page=2", VisitOptions::default()).await?;
//! if meta.can_navigate {
//!     navigator.navigate_to(meta.remote.page_key.as_str(), NavigateOptions::push());
//! }
//! ```

mod defer;
mod error;
mod nav;
mod notify;
mod pipeline;
mod sequencer;
mod session;

pub use defer::*;
pub use error::*;
pub use nav::*;
pub use notify::*;
pub use pipeline::*;
pub use sequencer::*;
pub use session::*;
