//! Cache error types.

use pagegraft_core::PageKey;
use thiserror::Error;

/// Errors that can occur when mutating the page cache.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// A graft targeted a page that is not cached.
    #[error(
        "Looked for {page_key} in the page cache, but could not find it. \
         Did you forget to pass a valid page_key to remote or visit?"
    )]
    PageNotFound { page_key: PageKey },
}
