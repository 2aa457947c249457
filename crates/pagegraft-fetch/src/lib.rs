//! Transport seam for the pagegraft engine.
//!
//! The engine never talks to the network itself. It hands a [`FetchRequest`]
//! to a [`Transport`] and decodes the returned [`Response`] into a page.
//!
//! This crate provides:
//! - `Transport` - async fetch trait implemented by the embedding application
//! - `FetchRequest` - request builder (method, headers, body)
//! - `Response` / `ResponseMeta` - raw response and the metadata kept after decoding
//! - `StaticTransport` - canned in-memory responses keyed by URL
//! - `TransportError` - non-2xx, undecodable or failed fetches
//!
//! # Example
//!
//! ```rust,ignore
//! use pagegraft_fetch::{FetchRequest, StaticTransport, Transport};
//! use pagegraft_core::PageResponse;
//! use serde_json::json;
//!
//! let transport = StaticTransport::new()
//!     .with_page("/products", PageResponse::new(json!({"items": []})));
//!
//! let response = transport.fetch(FetchRequest::get("/products")).await?;
//! let (meta, page) = response.into_page()?;
//! ```

mod error;
mod request;
mod response;
mod transport;

pub use error::TransportError;
pub use http::{Method, StatusCode};
pub use request::FetchRequest;
pub use response::{Response, ResponseMeta};
pub use transport::{StaticTransport, Transport};
