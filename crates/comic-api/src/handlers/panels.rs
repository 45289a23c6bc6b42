//! Panel status, generation and deletion handlers.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use comic_models::{PanelStatus, FORCE_OVERWRITE_HEADER};

use crate::error::ApiResult;
use crate::state::AppState;

/// Path parameters shared by the panel routes.
pub type PanelPath = Path<(String, String, String)>;

/// HTTP status for a panel status body.
pub fn status_code_for(status: &PanelStatus) -> StatusCode {
    match status {
        PanelStatus::Ready { .. } | PanelStatus::Deleted { .. } => StatusCode::OK,
        PanelStatus::Generating => StatusCode::ACCEPTED,
        PanelStatus::Missing => StatusCode::NOT_FOUND,
        PanelStatus::Error { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Render a panel status. `generating` carries `Retry-After: 1`.
pub fn status_response(status: PanelStatus) -> Response {
    let code = status_code_for(&status);
    if status == PanelStatus::Generating {
        (code, [(header::RETRY_AFTER, "1")], Json(status)).into_response()
    } else {
        (code, Json(status)).into_response()
    }
}

/// GET /comics/:video/:style/:bucket
pub async fn get_panel(
    State(state): State<AppState>,
    Path((video, style, bucket)): PanelPath,
) -> ApiResult<Response> {
    let identity = state.panels.identity(&video, &style, &bucket)?;
    let status = state.panels.status(&identity).await;
    Ok(status_response(status))
}

/// POST /comics/:video/:style/:bucket
///
/// Body is the raw frame. `X-Force-Overwrite: 1` regenerates an existing
/// panel.
pub async fn create_panel(
    State(state): State<AppState>,
    Path((video, style, bucket)): PanelPath,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let identity = state.panels.identity(&video, &style, &bucket)?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let force = headers
        .get(FORCE_OVERWRITE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "1")
        .unwrap_or(false);

    let outcome = state
        .panels
        .request_generation(identity, body.to_vec(), content_type, force)
        .await?;

    Ok(status_response(outcome.status()))
}

/// DELETE /comics/:video/:style/:bucket
pub async fn delete_panel(
    State(state): State<AppState>,
    Path((video, style, bucket)): PanelPath,
) -> ApiResult<Response> {
    let identity = state.panels.identity(&video, &style, &bucket)?;
    let status = state.panels.delete(&identity).await?;
    Ok(status_response(status))
}
