use axum::{
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};

use crate::error::AppError;
use crate::state::AppState;

pub const WEBHOOK_SECRET_HEADER: &str = "x-toss-payments-secret";

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/payments/webhook", post(handle_payment_webhook))
}

/// POST /v1/payments/webhook
/// Delivered by the gateway, not a browser. Duplicates and stale statuses
/// are acknowledged with 200 so the gateway stops retrying.
pub async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let secret = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|value| value.to_str().ok());

    let ack = state.reconciler.handle_webhook(&payload, secret).await?;
    tracing::info!(?ack, "Webhook handled");

    let mut body = serde_json::to_value(&ack).map_err(|e| AppError::Internal(e.to_string()))?;
    if let Value::Object(fields) = &mut body {
        fields.insert("ok".to_string(), json!(true));
    }
    Ok(Json(body))
}
