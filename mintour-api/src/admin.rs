use axum::{
    extract::{Path, State},
    routing::post,
    Extension, Json, Router,
};
use mintour_core::OrderStatus;
use mintour_order::TransitionOutcome;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SettleRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub changed: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/admin/orders/{id}/settle", post(settle_order))
}

/// POST /v1/admin/orders/{id}/settle
/// Confirms a received bank transfer or cancels the order
pub async fn settle_order(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Path(order_id): Path<Uuid>,
    Json(body): Json<SettleRequest>,
) -> Result<Json<SettleResponse>, AppError> {
    tracing::info!(%order_id, admin = %admin.as_str(), status = %body.status, "Manual settlement");

    let response = match state
        .reconciler
        .settle_manually(order_id, body.status)
        .await?
    {
        TransitionOutcome::Applied { to, .. } => SettleResponse {
            order_id,
            status: to,
            changed: true,
        },
        TransitionOutcome::AlreadyApplied(status) => SettleResponse {
            order_id,
            status,
            changed: false,
        },
        TransitionOutcome::Conflict { current, requested } => {
            return Err(AppError::Conflict(format!(
                "Order {order_id} is {current} and can't become {requested}"
            )))
        }
    };

    Ok(Json(response))
}
