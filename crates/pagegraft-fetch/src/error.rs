//! Transport error types.

use thiserror::Error;

use crate::response::Response;

/// Errors raised by a top-level fetch.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// The transport could not produce a response.
    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    /// Non-2xx response.
    #[error("HTTP {} from {}", .response.status, .response.url)]
    Http { response: Box<Response> },

    /// The body was not a page payload.
    #[error("Failed to decode page from {}: {message}", .response.url)]
    Decode {
        message: String,
        response: Box<Response>,
    },
}

impl TransportError {
    /// The response that caused the error, when there was one.
    pub fn response(&self) -> Option<&Response> {
        match self {
            TransportError::Request { .. } => None,
            TransportError::Http { response } | TransportError::Decode { response, .. } => {
                Some(&**response)
            }
        }
    }

    /// The requested URL.
    pub fn url(&self) -> &str {
        match self {
            TransportError::Request { url, .. } => url,
            TransportError::Http { response } | TransportError::Decode { response, .. } => {
                &response.url
            }
        }
    }
}
