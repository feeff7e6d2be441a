use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::post,
    Extension, Json, Router,
};
use chrono::Utc;
use mintour_order::{
    BankTransferInstructions, CheckoutRequest, CheckoutTarget, OrderDraft, PaymentDispatcher,
    PaymentHandoff,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BankTransferResponse {
    pub order: OrderDraft,
    pub instructions: BankTransferInstructions,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Link,
    Widget,
}

#[derive(Debug, Default, Deserialize)]
pub struct RedispatchQuery {
    #[serde(default)]
    pub method: PaymentMethod,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/checkout/bank-transfer", post(checkout_bank_transfer))
        .route("/v1/checkout/payment-link", post(checkout_payment_link))
        .route("/v1/checkout/widget", post(checkout_widget))
        .route("/v1/orders/{id}/payment", post(redispatch_order))
}

/// POST /v1/checkout/bank-transfer
/// Creates the order, empties the cart and returns deposit instructions.
/// The order stays pending until an operator confirms the deposit.
pub async fn checkout_bank_transfer(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<BankTransferResponse>), AppError> {
    let order = state.materializer.materialize(&user, &request, true).await?;
    let instructions = state
        .settings
        .bank_account
        .instructions_for(&order, Utc::now());

    Ok((
        StatusCode::CREATED,
        Json(BankTransferResponse {
            order,
            instructions,
        }),
    ))
}

/// POST /v1/checkout/payment-link
/// The cart is kept until payment is confirmed
pub async fn checkout_payment_link(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<PaymentHandoff>), AppError> {
    let order = state.materializer.materialize(&user, &request, false).await?;
    let handoff = state
        .redirect
        .dispatch(&user, &CheckoutTarget::from(&order))
        .await?;

    Ok((StatusCode::CREATED, Json(handoff)))
}

/// POST /v1/checkout/widget
pub async fn checkout_widget(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<PaymentHandoff>), AppError> {
    // A misconfigured key fails before any order is written
    state.widget.check_client_key()?;

    let order = state.materializer.materialize(&user, &request, false).await?;
    let handoff = state
        .widget
        .dispatch(&user, &CheckoutTarget::from(&order))
        .await?;

    Ok((StatusCode::CREATED, Json(handoff)))
}

/// POST /v1/orders/{id}/payment?method=link|widget
/// Retry payment for a pending order without creating a new one
pub async fn redispatch_order(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(order_id): Path<Uuid>,
    Query(query): Query<RedispatchQuery>,
) -> Result<Json<PaymentHandoff>, AppError> {
    let target = CheckoutTarget::for_pending_order(state.orders.as_ref(), &user, order_id).await?;

    let dispatcher: &dyn PaymentDispatcher = match query.method {
        PaymentMethod::Link => state.redirect.as_ref(),
        PaymentMethod::Widget => state.widget.as_ref(),
    };

    Ok(Json(dispatcher.dispatch(&user, &target).await?))
}
