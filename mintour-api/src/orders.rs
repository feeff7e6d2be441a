use axum::{
    extract::{Path, Query, State},
    routing::get,
    Extension, Json, Router,
};
use mintour_order::{HistoryQuery, OrderDetail, OrderPage};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/orders", get(list_orders))
        .route("/v1/orders/{id}", get(get_order))
}

/// GET /v1/orders?status=&limit=&cursor=
/// Newest first. `nextCursor` is set while more pages remain.
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<OrderPage>, AppError> {
    Ok(Json(state.history.list(&user, &query).await?))
}

/// GET /v1/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderDetail>, AppError> {
    Ok(Json(state.history.detail(&user, order_id).await?))
}
