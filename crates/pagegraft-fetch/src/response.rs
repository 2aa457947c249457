//! Transport responses.

use std::collections::BTreeMap;

use http::StatusCode;
use pagegraft_core::PageResponse;
use serde::de::DeserializeOwned;

use crate::TransportError;

/// A raw response returned by a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: BTreeMap<String, String>,
    /// Response body.
    pub body: Vec<u8>,
    /// Final URL after any redirects.
    pub url: String,
    /// Whether the transport followed a redirect.
    pub redirected: bool,
}

impl Response {
    /// Create a response for `url`.
    pub fn new(status: StatusCode, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
            url: url.into(),
            redirected: false,
        }
    }

    /// A 200 response carrying a page as JSON.
    ///
    /// Encoding cannot fail: a `PageResponse` holds only JSON values and
    /// string-keyed maps, which `serde_json` always serializes.
    pub fn page(url: impl Into<String>, page: &PageResponse) -> Self {
        let body = serde_json::to_vec(page).unwrap_or_default();
        Self::new(StatusCode::OK, url, body).with_header("Content-Type", "application/json")
    }

    /// Add a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Mark the response as the result of a redirect to `url`.
    pub fn redirected_to(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self.redirected = true;
        self
    }

    /// Check if the response was successful (2xx status).
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Get a header value.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Get the Content-Location header.
    pub fn content_location(&self) -> Option<&str> {
        self.header("Content-Location")
    }

    /// Parse the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        serde_json::from_slice(&self.body).map_err(|e| TransportError::Decode {
            message: e.to_string(),
            response: Box::new(self.clone()),
        })
    }

    /// Decode the body into a page.
    ///
    /// Non-2xx responses fail with [`TransportError::Http`]; bodies that are
    /// not page payloads fail with [`TransportError::Decode`]. Both carry the
    /// response.
    pub fn into_page(self) -> Result<(ResponseMeta, PageResponse), TransportError> {
        if !self.is_success() {
            return Err(TransportError::Http {
                response: Box::new(self),
            });
        }

        let page = self.json::<PageResponse>()?;
        Ok((ResponseMeta::from(&self), page))
    }
}

/// What the engine keeps of a response after decoding its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMeta {
    /// Status code.
    pub status: StatusCode,
    /// Final URL.
    pub url: String,
    /// Whether a redirect was followed.
    pub redirected: bool,
    /// Content-Location header, if present.
    pub content_location: Option<String>,
}

impl From<&Response> for ResponseMeta {
    fn from(response: &Response) -> Self {
        Self {
            status: response.status,
            url: response.url.clone(),
            redirected: response.redirected,
            content_location: response.content_location().map(str::to_string),
        }
    }
}
