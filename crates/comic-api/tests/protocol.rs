//! End-to-end tests of the panel status protocol against the router.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tower::ServiceExt;

use comic_api::{create_router, ApiConfig, AppState};
use comic_models::StyleCatalog;
use comic_storage::{ArtifactStore, KeyLayout, MemoryArtifactStore};
use comic_synth::{ImageSynthesizer, SynthError, SynthResult};

/// Synthesizer that blocks until the test releases it.
struct GatedSynth {
    calls: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    gate: Semaphore,
    fail: bool,
}

/// Counts a call as in flight until it returns or is dropped.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl GatedSynth {
    fn new(fail: bool) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
            gate: Semaphore::new(0),
            fail,
        }
    }

    fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn release(&self) {
        self.gate.add_permits(1);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageSynthesizer for GatedSynth {
    async fn synthesize(&self, frame: Vec<u8>, _: &str, _: &str) -> SynthResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let _running = InFlight(Arc::clone(&self.in_flight));
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| SynthError::MissingPayload)?;
        if self.fail {
            return Err(SynthError::Api {
                status: 500,
                body: "upstream exploded".into(),
            });
        }
        let mut panel = b"panel:".to_vec();
        panel.extend(frame);
        Ok(panel)
    }
}

struct Harness {
    app: Router,
    state: AppState,
    store: Arc<MemoryArtifactStore>,
    synth: Arc<GatedSynth>,
}

fn harness(fail: bool) -> Harness {
    let catalog = StyleCatalog::from_json(
        r#"{
            "noir": { "prompt": "high-contrast film noir", "label": "Noir" },
            "tintin": { "prompt": "ligne claire" }
        }"#,
    )
    .unwrap();
    let store = Arc::new(MemoryArtifactStore::new("https://cdn.test"));
    let synth = Arc::new(GatedSynth::new(fail));
    let config = ApiConfig {
        max_body_size: 1024,
        ..ApiConfig::default()
    };

    let state = AppState::from_parts(
        config,
        catalog,
        store.clone(),
        synth.clone(),
        KeyLayout::new("comics/"),
    );
    let app = create_router(state.clone(), None);

    Harness {
        app,
        state,
        store,
        synth,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, headers, body)
}

fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

fn delete(path: &str) -> Request<Body> {
    Request::builder()
        .method(Method::DELETE)
        .uri(path)
        .body(Body::empty())
        .unwrap()
}

fn post(path: &str, body: &'static [u8], force: bool) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(header::CONTENT_TYPE, "image/jpeg");
    if force {
        builder = builder.header("X-Force-Overwrite", "1");
    }
    builder.body(Body::from(body)).unwrap()
}

/// Poll until the panel leaves `generating`.
async fn wait_settled(app: &Router, path: &str) -> (StatusCode, Value) {
    for _ in 0..200 {
        let (status, _, body) = send(app, get(path)).await;
        if status != StatusCode::ACCEPTED {
            return (status, body);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("panel never settled");
}

/// Poll until `check` holds.
async fn eventually(what: &str, check: impl Fn() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

#[tokio::test]
async fn test_full_protocol_scenario() {
    let h = harness(false);

    // Unknown style is rejected before any store access.
    let (status, _, body) = send(&h.app, get("/comics/x/y/00-15")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    let (status, _, _) = send(&h.app, post("/comics/bbb/sepia/00-30", b"frame", false)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.store.total_calls(), 0);
    assert!(h.state.registry.is_empty().await);

    // First request starts a generation.
    let (status, headers, body) = send(&h.app, post("/comics/bbb/noir/00:30", b"frame", false)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, json!({ "status": "generating" }));
    assert_eq!(headers.get(header::RETRY_AFTER).unwrap(), "1");

    // A concurrent request joins it.
    let (status, _, body) = send(&h.app, post("/comics/bbb/noir/00-30", b"frame", false)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "generating");

    let (status, headers, _) = send(&h.app, get("/comics/bbb/noir/00-30")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(headers.get(header::RETRY_AFTER).unwrap(), "1");

    // Completion makes it ready.
    h.synth.release();
    let (status, body) = wait_settled(&h.app, "/comics/bbb/noir/00-30").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "status": "ready", "url": "https://cdn.test/comics/bbb/noir/00-30.jpg" })
    );
    assert_eq!(h.synth.calls(), 1);
    assert_eq!(
        h.store.get("comics/bbb/noir/00-30.jpg").await.unwrap().bytes,
        b"panel:frame"
    );

    // Deletion clears artifact and record.
    let (status, _, body) = send(&h.app, delete("/comics/bbb/noir/00-30")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "status": "deleted", "key": "comics/bbb/noir/00-30.jpg" })
    );

    let (status, _, body) = send(&h.app, get("/comics/bbb/noir/00-30")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "status": "missing" }));
}

#[tokio::test]
async fn test_concurrent_posts_start_one_generation() {
    let h = harness(false);

    let requests: Vec<_> = (0..8)
        .map(|_| {
            let app = h.app.clone();
            tokio::spawn(async move { send(&app, post("/comics/bbb/tintin/01-00", b"f", false)).await })
        })
        .collect();
    for request in requests {
        let (status, _, _) = request.await.unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    h.synth.release();
    let (status, _) = wait_settled(&h.app, "/comics/bbb/tintin/01-00").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.synth.calls(), 1);
}

#[tokio::test]
async fn test_delete_during_generation_cancels_it() {
    let h = harness(false);
    let path = "/comics/bbb/noir/00-30";

    let (status, _, _) = send(&h.app, post(path, b"first", false)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    eventually("first synthesis", || h.synth.in_flight() == 1).await;

    let (status, _, body) = send(&h.app, delete(path)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "deleted");
    eventually("first synthesis to stop", || h.synth.in_flight() == 0).await;

    let (status, _, body) = send(&h.app, get(path)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "missing");

    // A new request starts the only running generation.
    let (status, _, _) = send(&h.app, post(path, b"second", false)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    eventually("second synthesis", || h.synth.calls() == 2).await;
    assert_eq!(h.synth.in_flight(), 1);

    let (status, _, _) = send(&h.app, post(path, b"third", false)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(h.synth.calls(), 2);

    h.synth.release();
    let (status, body) = wait_settled(&h.app, path).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["url"], "https://cdn.test/comics/bbb/noir/00-30.jpg");
    assert_eq!(h.store.put_calls(), 1);
    assert_eq!(
        h.store.get("comics/bbb/noir/00-30.jpg").await.unwrap().bytes,
        b"panel:second"
    );
}

#[tokio::test]
async fn test_deleted_panel_stays_deleted_after_release() {
    let h = harness(false);
    let path = "/comics/bbb/noir/01-15";

    send(&h.app, post(path, b"frame", false)).await;
    eventually("synthesis", || h.synth.in_flight() == 1).await;

    let (status, _, _) = send(&h.app, delete(path)).await;
    assert_eq!(status, StatusCode::OK);
    h.synth.release();
    eventually("synthesis to stop", || h.synth.in_flight() == 0).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (status, _, body) = send(&h.app, get(path)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "missing");
    assert_eq!(h.store.put_calls(), 0);
    assert!(h.state.registry.is_empty().await);
}

#[tokio::test]
async fn test_ready_survives_registry_eviction() {
    let h = harness(false);

    send(&h.app, post("/comics/bbb/noir/00-15", b"frame", false)).await;
    h.synth.release();
    wait_settled(&h.app, "/comics/bbb/noir/00-15").await;

    let later = chrono::Utc::now() + chrono::Duration::minutes(10);
    assert_eq!(h.state.registry.sweep_at(later).await, 1);
    assert!(h.state.registry.is_empty().await);

    let (status, _, body) = send(&h.app, get("/comics/bbb/noir/00-15")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["url"], "https://cdn.test/comics/bbb/noir/00-15.jpg");
}

#[tokio::test]
async fn test_existing_panel_short_circuits_unless_forced() {
    let h = harness(false);
    h.store
        .put("comics/bbb/noir/02-00.jpg", b"old".to_vec(), "image/jpeg")
        .await
        .unwrap();

    let (status, _, body) = send(&h.app, post("/comics/bbb/noir/02-00", b"new", false)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
    assert_eq!(h.synth.calls(), 0);

    let (status, _, _) = send(&h.app, post("/comics/bbb/noir/02-00", b"new", true)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    h.synth.release();

    for _ in 0..200 {
        if h.store.get("comics/bbb/noir/02-00.jpg").await.unwrap().bytes == b"panel:new" {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("forced generation never overwrote the panel");
}

#[tokio::test]
async fn test_failed_generation_is_sticky_error() {
    let h = harness(true);

    send(&h.app, post("/comics/bbb/noir/00-45", b"frame", false)).await;
    h.synth.release();

    let (status, body) = wait_settled(&h.app, "/comics/bbb/noir/00-45").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().contains("upstream exploded"));

    let (status, _, _) = send(&h.app, get("/comics/bbb/noir/00-45")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(h.store.put_calls(), 0);
}

#[tokio::test]
async fn test_delete_never_created_then_missing() {
    let h = harness(false);

    for _ in 0..2 {
        let (status, _, body) = send(&h.app, delete("/comics/bbb/noir/09-45")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "deleted");
    }

    let (status, _, body) = send(&h.app, get("/comics/bbb/noir/09-45")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "missing");
}

#[tokio::test]
async fn test_validation_errors() {
    let h = harness(false);

    let (status, _, body) = send(&h.app, get("/comics/bbb/noir/1-75")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");

    let (status, _, _) = send(&h.app, get("/comics/bbb/noir/later")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, body) = send(&h.app, post("/comics/bbb/noir/00-30", b"", false)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Missing image body");

    let request = Request::builder()
        .method(Method::POST)
        .uri("/comics/bbb/noir/00-30")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("hello"))
        .unwrap();
    let (status, _, _) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(h.synth.calls(), 0);
    assert!(h.state.registry.is_empty().await);
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let h = harness(false);
    let request = Request::builder()
        .method(Method::POST)
        .uri("/comics/bbb/noir/00-30")
        .header(header::CONTENT_TYPE, "image/png")
        .body(Body::from(vec![0u8; 4096]))
        .unwrap();
    let (status, _, _) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(h.synth.calls(), 0);
}

#[tokio::test]
async fn test_styles_returns_catalog_uncached() {
    let h = harness(false);
    let (status, headers, body) = send(&h.app, get("/styles")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-store");
    assert_eq!(body["noir"]["prompt"], "high-contrast film noir");
    assert_eq!(body["noir"]["label"], "Noir");
    assert_eq!(body["tintin"]["prompt"], "ligne claire");
}

#[tokio::test]
async fn test_health_and_ready() {
    let h = harness(false);
    let (status, headers, body) = send(&h.app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(headers.get("x-request-id").is_some());

    let (status, _, body) = send(&h.app, get("/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
    assert_eq!(body["styles"], 2);
    assert_eq!(body["generating"], 0);

    send(&h.app, post("/comics/bbb/noir/00-15", b"frame", false)).await;
    let (_, _, body) = send(&h.app, get("/ready")).await;
    assert_eq!(body["generating"], 1);

    // Finished records stay in the registry but are no longer generating.
    h.synth.release();
    wait_settled(&h.app, "/comics/bbb/noir/00-15").await;
    let (_, _, body) = send(&h.app, get("/ready")).await;
    assert_eq!(body["generating"], 0);
    assert_eq!(h.state.registry.len().await, 1);
}
