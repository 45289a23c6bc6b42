//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "comic_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "comic_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "comic_http_requests_in_flight";

    // Generation metrics
    pub const GENERATIONS_STARTED_TOTAL: &str = "comic_generations_started_total";
    pub const GENERATIONS_COMPLETED_TOTAL: &str = "comic_generations_completed_total";
    pub const GENERATIONS_FAILED_TOTAL: &str = "comic_generations_failed_total";
    pub const GENERATION_DURATION_SECONDS: &str = "comic_generation_duration_seconds";
    pub const GENERATION_DEDUP_HITS_TOTAL: &str = "comic_generation_dedup_hits_total";

    // Registry metrics
    pub const JOB_REGISTRY_SIZE: &str = "comic_job_registry_size";
    pub const JOBS_SWEPT_TOTAL: &str = "comic_jobs_swept_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "comic_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_generation_started(style: &str) {
    let labels = [("style", style.to_string())];
    counter!(names::GENERATIONS_STARTED_TOTAL, &labels).increment(1);
}

pub fn record_generation_completed(style: &str, duration_secs: f64) {
    let labels = [("style", style.to_string())];
    counter!(names::GENERATIONS_COMPLETED_TOTAL, &labels).increment(1);
    histogram!(names::GENERATION_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_generation_failed(style: &str) {
    let labels = [("style", style.to_string())];
    counter!(names::GENERATIONS_FAILED_TOTAL, &labels).increment(1);
}

/// A generation request joined a job that was already running.
pub fn record_dedup_hit(style: &str) {
    let labels = [("style", style.to_string())];
    counter!(names::GENERATION_DEDUP_HITS_TOTAL, &labels).increment(1);
}

pub fn set_registry_size(size: usize) {
    gauge!(names::JOB_REGISTRY_SIZE).set(size as f64);
}

pub fn record_jobs_swept(count: usize) {
    counter!(names::JOBS_SWEPT_TOTAL).increment(count as u64);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Label for paths outside the router.
const UNMATCHED_PATH: &str = "unmatched";

/// Map a request path to a route label. Only routed paths keep their own
/// label so cardinality stays bounded.
fn sanitize_path(path: &str) -> String {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    let label = match segments.as_slice() {
        ["comics", _, _, _] => crate::routes::PANEL_PATH,
        ["styles"] => "/styles",
        ["health"] => "/health",
        ["healthz"] => "/healthz",
        ["ready"] => "/ready",
        ["metrics"] => "/metrics",
        _ => UNMATCHED_PATH,
    };
    label.to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
