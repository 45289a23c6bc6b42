//! Liveness and readiness probes.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct Liveness {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: String,
}

/// Always 200 while the process serves requests.
pub async fn health() -> Json<Liveness> {
    Json(Liveness {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[derive(Serialize)]
pub struct StoreCheck {
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct Readiness {
    pub status: &'static str,
    pub styles: usize,
    pub generating: usize,
    pub store: StoreCheck,
}

/// 200 when styles are loaded and the panel store answers, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let started = Instant::now();
    let store = match state.store.check().await {
        Ok(()) => StoreCheck {
            reachable: true,
            latency_ms: Some(started.elapsed().as_millis() as u64),
            error: None,
        },
        Err(e) => StoreCheck {
            reachable: false,
            latency_ms: None,
            error: Some(e.to_string()),
        },
    };

    let styles = state.catalog.len();
    let serving = store.reachable && styles > 0;
    let body = Readiness {
        status: if serving { "ready" } else { "degraded" },
        styles,
        generating: state.registry.active().await,
        store,
    };
    let code = if serving {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body))
}
