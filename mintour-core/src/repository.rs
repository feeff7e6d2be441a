use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    CartProductRow, NewOrder, NewOrderLine, OrderLineRecord, OrderListQuery,
    OrderRecord, OrderStatus, ProductRow,
};

/// Failure reported by the storage capability
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Row could not be decoded: {0}")]
    Decode(String),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Repository trait for cart line access
#[async_trait]
pub trait CartRepository: Send + Sync {
    /// Every cart line of the user joined with its product, oldest line first
    async fn lines_with_products(&self, clerk_id: &str) -> StoreResult<Vec<CartProductRow>>;

    /// Atomically add `delta` to the (user, product) line, creating it if absent.
    /// The stored quantity never exceeds [`MAX_LINE_QUANTITY`](crate::MAX_LINE_QUANTITY).
    /// Returns the stored quantity after the increment.
    async fn increment_quantity(
        &self,
        clerk_id: &str,
        product_id: Uuid,
        delta: i32,
    ) -> StoreResult<i32>;

    /// Set the quantity of a line owned by the user. Returns false if no such line.
    async fn set_quantity(
        &self,
        clerk_id: &str,
        cart_item_id: Uuid,
        quantity: i32,
    ) -> StoreResult<bool>;

    /// Delete a line owned by the user. Returns false if no such line.
    async fn remove_line(&self, clerk_id: &str, cart_item_id: Uuid) -> StoreResult<bool>;

    /// Delete exactly the given line ids
    async fn delete_lines(&self, cart_item_ids: &[Uuid]) -> StoreResult<u64>;

    /// Delete the user's lines that reference any of the given products
    async fn delete_lines_for_products(
        &self,
        clerk_id: &str,
        product_ids: &[Uuid],
    ) -> StoreResult<u64>;

    /// Delete every line the user owns
    async fn clear_for_owner(&self, clerk_id: &str) -> StoreResult<u64>;
}

/// Repository trait for product catalog access
#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn get_product(&self, id: Uuid) -> StoreResult<Option<ProductRow>>;
}

/// Repository trait for order data access
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert an order row in `pending` status and return its id
    async fn insert_order(&self, order: &NewOrder) -> StoreResult<Uuid>;

    async fn insert_order_lines(&self, order_id: Uuid, lines: &[NewOrderLine]) -> StoreResult<()>;

    async fn get_order(&self, id: Uuid) -> StoreResult<Option<OrderRecord>>;

    async fn order_lines(&self, order_id: Uuid) -> StoreResult<Vec<OrderLineRecord>>;

    async fn count_order_lines(&self, order_id: Uuid) -> StoreResult<u64>;

    /// Conditional write: set `next` only while the stored status is still `expected`.
    /// Returns whether the row changed.
    async fn update_status_if_current_is(
        &self,
        id: Uuid,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> StoreResult<bool>;

    /// The user's orders, newest first, at most `query.limit` rows
    async fn list_orders(&self, clerk_id: &str, query: &OrderListQuery) -> StoreResult<Vec<OrderRecord>>;
}
