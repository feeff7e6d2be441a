use axum::{extract::State, routing::post, Extension, Json, Router};
use mintour_order::{ConfirmOutcome, ConfirmPayment};

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/payments/confirm", post(confirm_payment))
}

/// POST /v1/payments/confirm
/// Called by the success page with what the gateway appended to the callback URL
pub async fn confirm_payment(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(request): Json<ConfirmPayment>,
) -> Result<Json<ConfirmOutcome>, AppError> {
    tracing::info!(order_id = %request.order_id, "Confirming payment");
    Ok(Json(state.reconciler.confirm(&user, &request).await?))
}
