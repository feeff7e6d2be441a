pub mod models;
pub mod repository;
pub mod identity;
pub mod payment;

pub use identity::{IdentityProvider, UserId};
pub use models::{
    CartLine, CartProductRow, NewOrder, NewOrderLine, OrderCursor, OrderLineRecord, OrderListQuery,
    OrderRecord, OrderStatus, ProductRow, ShippingAddress, MAX_LINE_QUANTITY,
};
pub use payment::{GatewayError, PaymentConfirmation, PaymentGateway, PaymentLinkRequest};
pub use repository::{CartRepository, OrderRepository, ProductRepository, StoreError, StoreResult};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Unknown order status: {0}")]
    UnknownStatus(String),
}
