//! Visit sequencing with responses released in a controlled order.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use pagegraft_core::{EngineConfig, PageResponse};
use pagegraft_engine::{EngineError, IngestionPipeline, Notice, VisitMeta, VisitOptions};
use pagegraft_fetch::{
    FetchRequest, Method, Response, StaticTransport, StatusCode, Transport, TransportError,
};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Holds each response until the test releases it.
#[derive(Default)]
struct GatedTransport {
    gates: Mutex<HashMap<String, oneshot::Receiver<Response>>>,
}

impl GatedTransport {
    fn gate(&self, url: &str) -> oneshot::Sender<Response> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().insert(url.to_string(), rx);
        tx
    }
}

#[async_trait]
impl Transport for GatedTransport {
    async fn fetch(&self, request: FetchRequest) -> Result<Response, TransportError> {
        let gate = self.gates.lock().remove(&request.url);
        let Some(gate) = gate else {
            return Err(TransportError::Request {
                url: request.url,
                message: "no gate".to_string(),
            });
        };
        gate.await.map_err(|_| TransportError::Request {
            url: request.url,
            message: "gate dropped".to_string(),
        })
    }
}

fn page(url: &str, marker: &str) -> Response {
    Response::page(url, &PageResponse::new(json!({ "page": marker })))
}

fn spawn_visit(pipeline: &IngestionPipeline, url: &'static str) -> JoinHandle<Result<VisitMeta, EngineError>> {
    let pipeline = pipeline.clone();
    tokio::spawn(async move { pipeline.visit(url, VisitOptions::default()).await })
}

async fn wait_for_generation(pipeline: &IngestionPipeline, generation: u64) {
    while pipeline.sequencer().current().map(|t| t.generation()) != Some(generation) {
        tokio::task::yield_now().await;
    }
}

// === Supersession Tests ===

#[tokio::test]
async fn test_later_visit_wins_when_it_finishes_first() {
    let transport = Arc::new(GatedTransport::default());
    let release_a = transport.gate("/a");
    let release_b = transport.gate("/b");
    let pipeline = IngestionPipeline::new(transport.clone(), EngineConfig::default());

    let a = spawn_visit(&pipeline, "/a");
    wait_for_generation(&pipeline, 1).await;
    let b = spawn_visit(&pipeline, "/b");
    wait_for_generation(&pipeline, 2).await;

    release_b.send(page("/b", "b")).unwrap();
    let b = b.await.unwrap().unwrap();
    release_a.send(page("/a", "a")).unwrap();
    let a = a.await.unwrap().unwrap();

    assert!(b.can_navigate);
    assert!(!a.can_navigate);
}

#[tokio::test]
async fn test_later_visit_wins_when_it_finishes_last() {
    let transport = Arc::new(GatedTransport::default());
    let release_a = transport.gate("/a");
    let release_b = transport.gate("/b");
    let pipeline = IngestionPipeline::new(transport.clone(), EngineConfig::default());

    let a = spawn_visit(&pipeline, "/a");
    wait_for_generation(&pipeline, 1).await;
    let b = spawn_visit(&pipeline, "/b");
    wait_for_generation(&pipeline, 2).await;

    release_a.send(page("/a", "a")).unwrap();
    let a = a.await.unwrap().unwrap();
    release_b.send(page("/b", "b")).unwrap();
    let b = b.await.unwrap().unwrap();

    assert!(!a.can_navigate);
    assert!(b.can_navigate);
}

#[tokio::test]
async fn test_superseded_visit_still_updates_cache() {
    let transport = Arc::new(GatedTransport::default());
    let release_a = transport.gate("/a");
    let release_b = transport.gate("/b");
    let pipeline = IngestionPipeline::new(transport.clone(), EngineConfig::default());

    let a = spawn_visit(&pipeline, "/a");
    wait_for_generation(&pipeline, 1).await;
    let b = spawn_visit(&pipeline, "/b");
    wait_for_generation(&pipeline, 2).await;

    release_b.send(page("/b", "b")).unwrap();
    release_a.send(page("/a", "a")).unwrap();
    let a = a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    assert!(!a.can_navigate);
    assert_eq!(pipeline.get_page("/a").unwrap().data, json!({"page": "a"}));
    assert_eq!(pipeline.get_page("/b").unwrap().data, json!({"page": "b"}));
}

// === Page Key Tests ===

#[tokio::test]
async fn test_visit_strips_control_params() {
    let transport = Arc::new(
        StaticTransport::new().with_page("/foo?q=1", PageResponse::new(json!({"ok": true}))),
    );
    let pipeline = IngestionPipeline::new(transport.clone(), EngineConfig::default());

    let meta = pipeline
        .visit("/foo?q=1&__=5&bzq=a.b&_=7", VisitOptions::default())
        .await
        .unwrap();

    assert_eq!(meta.remote.page_key.as_str(), "/foo?q=1");
    assert_eq!(transport.requests()[0].url, "/foo?q=1");
}

#[tokio::test]
async fn test_post_visit_uses_content_location() {
    let transport = Arc::new(StaticTransport::new().with_response(
        "/cart",
        Response::page("/cart", &PageResponse::new(json!({"items": 1})))
            .with_header("Content-Location", "/cart/42?__=1"),
    ));
    let pipeline = IngestionPipeline::new(transport.clone(), EngineConfig::default());

    let meta = pipeline
        .visit(
            "/cart",
            VisitOptions::default()
                .with_method(Method::POST)
                .with_header("X-Requested-With", "XMLHttpRequest")
                .with_body("item=42"),
        )
        .await
        .unwrap();

    assert_eq!(meta.remote.page_key.as_str(), "/cart/42");
    assert!(pipeline.get_page("/cart/42").is_some());
    assert!(pipeline.get_page("/cart").is_none());

    let request = &transport.requests()[0];
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.body, "item=42");
    assert_eq!(
        request.headers.get("X-Requested-With").map(String::as_str),
        Some("XMLHttpRequest")
    );
}

#[tokio::test]
async fn test_get_visit_ignores_content_location() {
    let transport = Arc::new(StaticTransport::new().with_response(
        "/cart",
        Response::page("/cart", &PageResponse::new(json!({})))
            .with_header("Content-Location", "/cart/42"),
    ));
    let pipeline = IngestionPipeline::new(transport, EngineConfig::default());

    let meta = pipeline.visit("/cart", VisitOptions::default()).await.unwrap();
    assert_eq!(meta.remote.page_key.as_str(), "/cart");
}

#[tokio::test]
async fn test_redirected_visit_uses_final_url() {
    let transport = Arc::new(StaticTransport::new().with_response(
        "/old",
        Response::page("/old", &PageResponse::new(json!({"moved": true}))).redirected_to("/new?__=3"),
    ));
    let pipeline = IngestionPipeline::new(transport, EngineConfig::default());

    let meta = pipeline.visit("/old", VisitOptions::default()).await.unwrap();

    assert!(meta.remote.redirected);
    assert_eq!(meta.remote.page_key.as_str(), "/new");
    assert!(pipeline.get_page("/new").is_some());
}

// === Meta Tests ===

#[tokio::test]
async fn test_visit_reports_needs_refresh() {
    let transport = Arc::new(StaticTransport::new().with_page(
        "/foo",
        PageResponse::new(json!({}))
            .with_assets(["application-456.js"])
            .with_component("foo/show"),
    ));
    let pipeline = IngestionPipeline::new(transport, EngineConfig::default());
    pipeline.set_assets(vec!["application-123.js".to_string()]);

    let meta = pipeline.visit("/foo", VisitOptions::default()).await.unwrap();

    assert!(meta.remote.needs_refresh);
    assert_eq!(meta.remote.component_identifier.as_deref(), Some("foo/show"));
    assert_eq!(meta.remote.status, StatusCode::OK);
}

// === Error Tests ===

#[tokio::test]
async fn test_visit_transport_error_leaves_cache_untouched() {
    let transport = Arc::new(StaticTransport::new().with_response(
        "/foo",
        Response::new(StatusCode::INTERNAL_SERVER_ERROR, "/foo", "boom"),
    ));
    let pipeline = IngestionPipeline::new(transport, EngineConfig::default());
    let mut notices = pipeline.subscribe();

    let err = pipeline
        .visit("/foo", VisitOptions::default())
        .await
        .unwrap_err();

    match err {
        EngineError::Transport(err) => {
            assert_eq!(err.response().unwrap().status, StatusCode::INTERNAL_SERVER_ERROR);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(pipeline.with_cache(|cache| cache.is_empty()));

    assert!(matches!(notices.try_recv().unwrap(), Notice::BeforeFetch { .. }));
    assert!(matches!(
        notices.try_recv().unwrap(),
        Notice::Error { page_key: Some(_), .. }
    ));
}

#[tokio::test]
async fn test_visit_undecodable_body() {
    let transport = Arc::new(StaticTransport::new().with_response(
        "/foo",
        Response::new(StatusCode::OK, "/foo", "<html>not json</html>"),
    ));
    let pipeline = IngestionPipeline::new(transport, EngineConfig::default());

    let err = pipeline
        .visit("/foo", VisitOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::Transport(TransportError::Decode { .. })
    ));
}
