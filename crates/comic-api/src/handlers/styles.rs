//! Style catalog handler.

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;

use crate::state::AppState;

/// Return the full style catalog, including any extra per-style fields.
pub async fn list_styles(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "no-store")],
        Json(state.catalog.as_ref().clone()),
    )
}
