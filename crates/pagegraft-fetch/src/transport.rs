//! The transport trait and an in-memory implementation.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use http::StatusCode;
use pagegraft_core::PageResponse;
use parking_lot::Mutex;

use crate::{FetchRequest, Response, TransportError};

/// Sends requests on behalf of the engine.
///
/// Implementations own header construction, cookies and retries. A returned
/// `Ok` may still be a non-2xx response; the engine checks the status.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request.
    async fn fetch(&self, request: FetchRequest) -> Result<Response, TransportError>;
}

/// Canned responses keyed by request URL.
///
/// Each URL holds a queue. Responses are handed out in order and the last one
/// repeats. URLs with no responses answer 404. Every request is recorded.
#[derive(Debug, Default)]
pub struct StaticTransport {
    responses: Mutex<BTreeMap<String, VecDeque<Response>>>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl StaticTransport {
    /// Create an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for `url`.
    pub fn with_response(self, url: impl Into<String>, response: Response) -> Self {
        self.push(url, response);
        self
    }

    /// Queue a 200 JSON page for `url`.
    pub fn with_page(self, url: impl Into<String>, page: PageResponse) -> Self {
        let url = url.into();
        let response = Response::page(url.clone(), &page);
        self.with_response(url, response)
    }

    /// Queue a response for `url`.
    pub fn push(&self, url: impl Into<String>, response: Response) {
        self.responses
            .lock()
            .entry(url.into())
            .or_default()
            .push_back(response);
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().clone()
    }

    fn next_response(&self, url: &str) -> Option<Response> {
        let mut responses = self.responses.lock();
        let queue = responses.get_mut(url)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl Transport for StaticTransport {
    async fn fetch(&self, request: FetchRequest) -> Result<Response, TransportError> {
        let url = request.url.clone();
        self.requests.lock().push(request);

        match self.next_response(&url) {
            Some(response) => Ok(response),
            None => {
                tracing::debug!(url = %url, "no canned response");
                Ok(Response::new(StatusCode::NOT_FOUND, url, Vec::new()))
            }
        }
    }
}
