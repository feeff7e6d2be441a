use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use mintour_cart::{AddedLine, CartView, QuantityChange};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: Uuid,
    #[serde(default)]
    pub quantity: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i64,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/cart", get(list_cart))
        .route("/v1/cart/items", post(add_item))
        .route("/v1/cart/items/{id}", patch(update_quantity).delete(remove_item))
}

/// GET /v1/cart
pub async fn list_cart(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<CartView>, AppError> {
    Ok(Json(state.cart.list(&user).await?))
}

/// POST /v1/cart/items
pub async fn add_item(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<AddedLine>), AppError> {
    let added = state.cart.add_item(&user, body.product_id, body.quantity).await?;
    Ok((StatusCode::CREATED, Json(added)))
}

/// PATCH /v1/cart/items/{id}
/// A quantity of zero or less removes the line
pub async fn update_quantity(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(cart_item_id): Path<Uuid>,
    Json(body): Json<UpdateQuantityRequest>,
) -> Result<Json<QuantityChange>, AppError> {
    Ok(Json(
        state
            .cart
            .update_quantity(&user, cart_item_id, body.quantity)
            .await?,
    ))
}

/// DELETE /v1/cart/items/{id}
pub async fn remove_item(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(cart_item_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.cart.remove_item(&user, cart_item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
