use std::sync::Arc;

use mintour_catalog::{PricingSnapshot, SnapshotError};
use mintour_core::repository::{CartRepository, OrderRepository};
use mintour_core::{CoreError, NewOrder, NewOrderLine, UserId};

use crate::models::{order_display_name, CheckoutRequest, OrderDraft};

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Invalid shipping details: {0}")]
    InvalidShipping(#[from] CoreError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("Order could not be stored: {0}")]
    OrderPersistence(String),
}

/// Turns the caller's cart into a `pending` order with frozen line prices
pub struct OrderMaterializer {
    carts: Arc<dyn CartRepository>,
    orders: Arc<dyn OrderRepository>,
}

impl OrderMaterializer {
    pub fn new(carts: Arc<dyn CartRepository>, orders: Arc<dyn OrderRepository>) -> Self {
        Self { carts, orders }
    }

    pub async fn materialize(
        &self,
        user: &UserId,
        request: &CheckoutRequest,
        clear_cart_after: bool,
    ) -> Result<OrderDraft, OrderError> {
        let (shipping_address, order_note) = request.normalized()?;
        let snapshot = PricingSnapshot::capture(self.carts.as_ref(), user).await?;

        let order = NewOrder {
            clerk_id: user.as_str().to_string(),
            total_amount: snapshot.total,
            shipping_address,
            order_note,
        };

        let order_id = self.orders.insert_order(&order).await.map_err(|e| {
            tracing::error!(clerk_id = %user, error = %e, "Failed to insert order");
            OrderError::OrderPersistence(e.to_string())
        })?;

        let lines: Vec<NewOrderLine> = snapshot
            .lines
            .iter()
            .map(|line| NewOrderLine {
                product_id: line.product_id,
                product_name: line.product_name.clone(),
                quantity: line.quantity,
                price: line.unit_price,
            })
            .collect();

        if let Err(e) = self.orders.insert_order_lines(order_id, &lines).await {
            // The order row stays behind with no lines; settlement refuses to confirm it
            tracing::error!(
                %order_id,
                clerk_id = %user,
                error = %e,
                manual_review = true,
                "Failed to insert order lines"
            );
            return Err(OrderError::OrderPersistence(e.to_string()));
        }

        if clear_cart_after {
            match self.carts.delete_lines(&snapshot.cart_item_ids()).await {
                Ok(removed) => tracing::debug!(%order_id, removed, "Consumed cart lines removed"),
                Err(e) => tracing::warn!(
                    %order_id,
                    clerk_id = %user,
                    error = %e,
                    "Order created but cart lines could not be removed"
                ),
            }
        }

        let order_name = order_display_name(
            order_id,
            snapshot.lines.first().map(|line| line.product_name.as_str()),
        );

        tracing::info!(
            %order_id,
            clerk_id = %user,
            total = %snapshot.total,
            lines = lines.len(),
            "Order materialized"
        );

        Ok(OrderDraft {
            order_id,
            order_name,
            total_amount: snapshot.total,
            lines: snapshot.lines,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mintour_core::OrderStatus;
    use mintour_store::InMemoryStore;
    use rust_decimal::Decimal;

    fn checkout() -> CheckoutRequest {
        serde_json::from_value(serde_json::json!({
            "recipient": "홍길동",
            "phone": "01012345678",
            "postcode": "63000",
            "addressLine1": "제주시 첨단로 242",
            "orderNote": "문 앞에 놓아주세요"
        }))
        .unwrap()
    }

    fn setup() -> (Arc<InMemoryStore>, OrderMaterializer) {
        let store = Arc::new(InMemoryStore::new());
        let materializer = OrderMaterializer::new(store.clone(), store.clone());
        (store, materializer)
    }

    #[tokio::test]
    async fn test_one_order_and_n_lines_with_snapshot_total() {
        let (store, materializer) = setup();
        let user = UserId::new("user_a");
        let tour = store.seed_product("Jeju Tour", "150000").await;
        let pillow = store.seed_product("Travel Pillow", "12500").await;
        store.increment_quantity("user_a", tour, 2).await.unwrap();
        store.increment_quantity("user_a", pillow, 1).await.unwrap();

        let draft = materializer.materialize(&user, &checkout(), false).await.unwrap();

        // Later price changes never touch the order
        store.set_product_price(tour, Some("99000")).await;

        let order = store.get_order(draft.order_id).await.unwrap().unwrap();
        let lines = store.order_lines(draft.order_id).await.unwrap();

        assert_eq!(store.order_count().await, 1);
        assert_eq!(lines.len(), 2);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_amount, Decimal::from(312500));
        let line_sum: Decimal = lines
            .iter()
            .map(|line| line.price * Decimal::from(line.quantity))
            .sum();
        assert_eq!(order.total_amount, line_sum);
        assert_eq!(draft.order_name, "Jeju Tour");
        assert_eq!(order.order_note.as_deref(), Some("문 앞에 놓아주세요"));
    }

    #[tokio::test]
    async fn test_empty_cart_creates_nothing() {
        let (store, materializer) = setup();

        let result = materializer
            .materialize(&UserId::new("user_a"), &checkout(), true)
            .await;

        assert!(matches!(
            result,
            Err(OrderError::Snapshot(SnapshotError::EmptyCart))
        ));
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_product_creates_nothing() {
        let (store, materializer) = setup();
        let tour = store.seed_product("Jeju Tour", "150000").await;
        let gone = store.seed_product("Gone", "1000").await;
        store.increment_quantity("user_a", tour, 1).await.unwrap();
        store.increment_quantity("user_a", gone, 1).await.unwrap();
        store.delete_product(gone).await;

        let result = materializer
            .materialize(&UserId::new("user_a"), &checkout(), true)
            .await;

        assert!(matches!(
            result,
            Err(OrderError::Snapshot(SnapshotError::InvalidProduct { .. }))
        ));
        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.cart_lines("user_a").await.len(), 2);
    }

    #[tokio::test]
    async fn test_clear_removes_only_snapshotted_lines() {
        let (store, materializer) = setup();
        let tour = store.seed_product("Jeju Tour", "150000").await;
        store.increment_quantity("user_a", tour, 1).await.unwrap();

        materializer
            .materialize(&UserId::new("user_a"), &checkout(), true)
            .await
            .unwrap();
        assert!(store.cart_lines("user_a").await.is_empty());
    }

    #[tokio::test]
    async fn test_keep_cart_when_not_clearing() {
        let (store, materializer) = setup();
        let tour = store.seed_product("Jeju Tour", "150000").await;
        store.increment_quantity("user_a", tour, 1).await.unwrap();

        materializer
            .materialize(&UserId::new("user_a"), &checkout(), false)
            .await
            .unwrap();
        assert_eq!(store.cart_lines("user_a").await.len(), 1);
    }

    #[tokio::test]
    async fn test_cart_delete_failure_still_returns_order() {
        let (store, materializer) = setup();
        let tour = store.seed_product("Jeju Tour", "150000").await;
        store.increment_quantity("user_a", tour, 1).await.unwrap();
        store.fail_cart_deletes(true).await;

        let draft = materializer
            .materialize(&UserId::new("user_a"), &checkout(), true)
            .await
            .unwrap();

        assert!(store.get_order(draft.order_id).await.unwrap().is_some());
        assert_eq!(store.cart_lines("user_a").await.len(), 1);
    }

    #[tokio::test]
    async fn test_line_insert_failure_leaves_zero_line_pending_order() {
        let (store, materializer) = setup();
        let tour = store.seed_product("Jeju Tour", "150000").await;
        store.increment_quantity("user_a", tour, 1).await.unwrap();
        store.fail_next_line_insert().await;

        let result = materializer
            .materialize(&UserId::new("user_a"), &checkout(), true)
            .await;

        assert!(matches!(result, Err(OrderError::OrderPersistence(_))));
        let orders = store
            .list_orders("user_a", &mintour_core::OrderListQuery { limit: 10, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, OrderStatus::Pending);
        assert_eq!(store.count_order_lines(orders[0].id).await.unwrap(), 0);
        // Cart is left alone on failure
        assert_eq!(store.cart_lines("user_a").await.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_shipping_rejected_before_reading_cart() {
        let (store, materializer) = setup();
        let mut request = checkout();
        request.shipping.recipient = "a".into();

        let result = materializer
            .materialize(&UserId::new("user_a"), &request, true)
            .await;

        assert!(matches!(result, Err(OrderError::InvalidShipping(_))));
        assert_eq!(store.order_count().await, 0);
    }
}
