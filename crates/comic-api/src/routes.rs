//! Router assembly.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{create_panel, delete_panel, get_panel, health, list_styles, ready};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
    ClientRateLimiter,
};
use crate::state::AppState;

/// One panel per (video, style, bucket).
pub const PANEL_PATH: &str = "/comics/:video/:style/:bucket";

/// Build the service router. `/metrics` is mounted only with a recorder handle.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let limiter = Arc::new(ClientRateLimiter::new(state.config.rate_limit_rps));

    // Only panel traffic is rate limited.
    let panels = Router::new()
        .route(
            PANEL_PATH,
            get(get_panel).post(create_panel).delete(delete_panel),
        )
        .route_layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));

    let mut service = Router::new()
        .route("/styles", get(list_styles))
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));
    if let Some(handle) = metrics_handle {
        service = service.route("/metrics", get(move || async move { handle.render() }));
    }

    panels
        .merge(service)
        // Frames arrive as raw bodies, capped here instead of by the extractor.
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
