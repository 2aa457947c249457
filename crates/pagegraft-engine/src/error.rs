//! Engine error types.

use pagegraft_cache::CacheError;
use pagegraft_core::{KeyPath, PageKey};
use pagegraft_fetch::TransportError;
use thiserror::Error;

/// Errors surfaced to callers of the pipeline.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// A cache mutation failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A top-level fetch failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The current page's component is not registered.
    #[error(transparent)]
    ComponentNotFound(#[from] ComponentNotFound),
}

/// A failed `auto` deferment.
///
/// Never aborts the enclosing ingestion or sibling deferments.
#[derive(Error, Debug, Clone)]
#[error("Deferred fetch of {url} for {page_key} failed: {source}")]
pub struct DeferredFetchError {
    /// The deferment URL.
    pub url: String,
    /// Page the deferment belongs to.
    pub page_key: PageKey,
    /// Key path requested through the URL's fragment query.
    pub key_path: Option<KeyPath>,
    /// What went wrong.
    #[source]
    pub source: Box<EngineError>,
}

/// No registered component matches a page's identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Navigator was looking for {} but could not find it in your mapping.{}", identifier_display(.identifier), reminder(.identifier))]
pub struct ComponentNotFound {
    /// The page's component identifier, if it had one.
    pub identifier: Option<String>,
}

fn identifier_display(identifier: &Option<String>) -> &str {
    identifier.as_deref().unwrap_or("an unset component identifier")
}

fn reminder(identifier: &Option<String>) -> &'static str {
    match identifier {
        Some(_) => "",
        None => " Did you forget to add `json.component_identifier` in your application.json.props layout?",
    }
}
