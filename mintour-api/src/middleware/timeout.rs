use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::state::AppState;

/// Bounds every request; storage and gateway calls made while serving it are
/// dropped when the deadline passes.
pub async fn request_timeout_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    let limit = state.settings.request_timeout;

    match tokio::time::timeout(limit, next.run(req)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(%path, timeout_ms = limit.as_millis() as u64, "Request timed out");
            (
                StatusCode::GATEWAY_TIMEOUT,
                Json(json!({ "error": "Request timed out" })),
            )
                .into_response()
        }
    }
}
