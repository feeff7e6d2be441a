use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mintour_cart::CartError;
use mintour_catalog::{ProductError, SnapshotError};
use mintour_order::{DispatchError, HistoryError, OrderError, SettlementError};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Sign-in required")]
    AuthRequired { sign_in_url: String },
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{message}")]
    Gateway { message: String, code: Option<String> },
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::AuthRequired { sign_in_url } => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "Sign-in required", "signInUrl": sign_in_url }),
            ),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            AppError::Gateway { message, code } => (
                StatusCode::BAD_GATEWAY,
                json!({ "error": message, "code": code }),
            ),
            AppError::Internal(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

fn product_error(err: ProductError) -> AppError {
    match err {
        ProductError::NotFound(_) => AppError::NotFound("Product not found".to_string()),
        other => AppError::Validation(other.to_string()),
    }
}

impl From<CartError> for AppError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::ProductUnavailable(e) => product_error(e),
            CartError::LineNotFound(_) => AppError::NotFound("Cart item not found".to_string()),
            CartError::Storage(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidShipping(e) => AppError::Validation(e.to_string()),
            OrderError::Snapshot(SnapshotError::Storage(e)) => AppError::Internal(e.to_string()),
            OrderError::Snapshot(e) => AppError::Validation(e.to_string()),
            OrderError::OrderPersistence(e) => AppError::Internal(e),
        }
    }
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::WidgetInit(msg) => AppError::Gateway {
                message: format!("Payment could not be started: {msg}"),
                code: None,
            },
            DispatchError::Gateway(e) => gateway_error(e),
            DispatchError::NotFound(_) => AppError::NotFound("Order not found".to_string()),
            e @ (DispatchError::NotPayable { .. } | DispatchError::IncompleteOrder(_)) => {
                AppError::Conflict(e.to_string())
            }
            DispatchError::Storage(e) => AppError::Internal(e.to_string()),
        }
    }
}

fn gateway_error(err: mintour_core::GatewayError) -> AppError {
    match err {
        mintour_core::GatewayError::Rejected { message, code, .. } => AppError::Gateway { message, code },
        other => AppError::Gateway {
            message: other.to_string(),
            code: None,
        },
    }
}

impl From<SettlementError> for AppError {
    fn from(err: SettlementError) -> Self {
        match err {
            SettlementError::NotFound(_) | SettlementError::UnknownOrder(_) => {
                AppError::NotFound("Order not found".to_string())
            }
            e @ (SettlementError::AmountMismatch { .. } | SettlementError::InvalidRequest(_)) => {
                AppError::Validation(e.to_string())
            }
            e @ (SettlementError::IncompleteOrder(_)
            | SettlementError::NotPayable { .. }
            | SettlementError::Conflict { .. }
            | SettlementError::Contended(_)) => AppError::Conflict(e.to_string()),
            SettlementError::Unauthorized => AppError::Unauthorized("unauthorized".to_string()),
            SettlementError::Gateway(e) => gateway_error(e),
            SettlementError::Storage(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<HistoryError> for AppError {
    fn from(err: HistoryError) -> Self {
        match err {
            HistoryError::NotFound(_) => AppError::NotFound("Order not found".to_string()),
            e @ HistoryError::InvalidCursor(_) => AppError::Validation(e.to_string()),
            HistoryError::Storage(e) => AppError::Internal(e.to_string()),
        }
    }
}
