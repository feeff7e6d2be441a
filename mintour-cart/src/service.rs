use std::sync::Arc;

use mintour_catalog::{Product, ProductError};
use mintour_core::repository::{CartRepository, ProductRepository};
use mintour_core::{StoreError, UserId};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{
    normalize_add_quantity, AddedLine, CartLineView, CartView, QuantityChange, MAX_LINE_QUANTITY,
};

#[derive(Debug, thiserror::Error)]
pub enum CartError {
    #[error("Product can't be added: {0}")]
    ProductUnavailable(#[from] ProductError),

    #[error("Cart line not found: {0}")]
    LineNotFound(Uuid),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Cart line operations, always scoped to the calling user
pub struct CartService {
    carts: Arc<dyn CartRepository>,
    products: Arc<dyn ProductRepository>,
}

impl CartService {
    pub fn new(carts: Arc<dyn CartRepository>, products: Arc<dyn ProductRepository>) -> Self {
        Self { carts, products }
    }

    /// Add `quantity` of a product, merging with an existing line for the same product
    pub async fn add_item(
        &self,
        user: &UserId,
        product_id: Uuid,
        quantity: Option<i64>,
    ) -> Result<AddedLine, CartError> {
        let row = self
            .products
            .get_product(product_id)
            .await?
            .ok_or(ProductError::NotFound(product_id))?;
        let product = Product::try_from(row)?;
        product.ensure_on_sale()?;

        let delta = normalize_add_quantity(quantity);
        let stored = self
            .carts
            .increment_quantity(user.as_str(), product_id, delta)
            .await?;

        tracing::debug!(clerk_id = %user, %product_id, delta, stored, "Cart line incremented");

        Ok(AddedLine {
            product_id,
            quantity: stored,
        })
    }

    /// Set a line's quantity; zero or less removes it
    pub async fn update_quantity(
        &self,
        user: &UserId,
        cart_item_id: Uuid,
        quantity: i64,
    ) -> Result<QuantityChange, CartError> {
        if quantity <= 0 {
            self.remove_item(user, cart_item_id).await?;
            return Ok(QuantityChange::Removed);
        }

        let quantity = quantity.min(MAX_LINE_QUANTITY as i64) as i32;
        if !self
            .carts
            .set_quantity(user.as_str(), cart_item_id, quantity)
            .await?
        {
            return Err(CartError::LineNotFound(cart_item_id));
        }

        Ok(QuantityChange::Updated { quantity })
    }

    pub async fn remove_item(&self, user: &UserId, cart_item_id: Uuid) -> Result<(), CartError> {
        if !self.carts.remove_line(user.as_str(), cart_item_id).await? {
            return Err(CartError::LineNotFound(cart_item_id));
        }

        tracing::debug!(clerk_id = %user, %cart_item_id, "Cart line removed");
        Ok(())
    }

    pub async fn list(&self, user: &UserId) -> Result<CartView, CartError> {
        let rows = self.carts.lines_with_products(user.as_str()).await?;

        let mut subtotal = Decimal::ZERO;
        let mut item_count = 0i64;
        let mut lines = Vec::with_capacity(rows.len());

        for row in rows {
            let product_name = row.product.as_ref().map(|p| p.name.clone());
            let product = row
                .product
                .map(Product::try_from)
                .and_then(Result::ok)
                .filter(|product| product.is_active);

            let priced = product.and_then(|product| {
                product
                    .price
                    .checked_mul(Decimal::from(row.quantity))
                    .map(|total| (product.price, total))
            });

            let available = priced.is_some() && row.quantity > 0;
            if let (true, Some((_, line_total))) = (available, priced) {
                subtotal = subtotal.checked_add(line_total).unwrap_or(subtotal);
                item_count += i64::from(row.quantity);
            }

            lines.push(CartLineView {
                cart_item_id: row.cart_item_id,
                product_id: row.product_id,
                product_name,
                quantity: row.quantity,
                unit_price: priced.map(|(price, _)| price),
                line_total: priced.map(|(_, total)| total),
                available,
            });
        }

        Ok(CartView {
            lines,
            subtotal,
            item_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mintour_store::InMemoryStore;

    fn setup() -> (Arc<InMemoryStore>, CartService) {
        let store = Arc::new(InMemoryStore::new());
        let service = CartService::new(store.clone(), store.clone());
        (store, service)
    }

    #[tokio::test]
    async fn test_add_merges_into_one_line() {
        let (store, service) = setup();
        let user = UserId::new("user_a");
        let tour = store.seed_product("Jeju Tour", "150000").await;

        service.add_item(&user, tour, Some(1)).await.unwrap();
        let added = service.add_item(&user, tour, Some(2)).await.unwrap();

        assert_eq!(added.quantity, 3);
        assert_eq!(store.cart_lines("user_a").await.len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_adds_stop_at_line_maximum() {
        let (store, service) = setup();
        let user = UserId::new("user_a");
        let tour = store.seed_product("Jeju Tour", "150000").await;

        service.add_item(&user, tour, Some(999)).await.unwrap();
        let added = service.add_item(&user, tour, Some(999)).await.unwrap();
        assert_eq!(added.quantity, MAX_LINE_QUANTITY);

        let added = service.add_item(&user, tour, None).await.unwrap();
        assert_eq!(added.quantity, MAX_LINE_QUANTITY);
        assert_eq!(store.cart_lines("user_a").await[0].quantity, MAX_LINE_QUANTITY);
    }

    #[tokio::test]
    async fn test_concurrent_adds_do_not_lose_updates() {
        let (store, service) = setup();
        let service = Arc::new(service);
        let tour = store.seed_product("Jeju Tour", "150000").await;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service
                    .add_item(&UserId::new("user_a"), tour, Some(1))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let lines = store.cart_lines("user_a").await;
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 10);
    }

    #[tokio::test]
    async fn test_add_rejects_missing_and_inactive_products() {
        let (store, service) = setup();
        let user = UserId::new("user_a");

        let missing = service.add_item(&user, Uuid::new_v4(), None).await;
        assert!(matches!(
            missing,
            Err(CartError::ProductUnavailable(ProductError::NotFound(_)))
        ));

        let retired = store.seed_product("Retired Tour", "1000").await;
        store.set_product_active(retired, false).await;
        let inactive = service.add_item(&user, retired, None).await;
        assert!(matches!(
            inactive,
            Err(CartError::ProductUnavailable(ProductError::Inactive(_)))
        ));

        assert!(store.cart_lines("user_a").await.is_empty());
    }

    #[tokio::test]
    async fn test_update_to_zero_removes_line() {
        let (store, service) = setup();
        let user = UserId::new("user_a");
        let tour = store.seed_product("Jeju Tour", "150000").await;
        service.add_item(&user, tour, Some(2)).await.unwrap();
        let line_id = store.cart_lines("user_a").await[0].id;

        let change = service.update_quantity(&user, line_id, 0).await.unwrap();

        assert_eq!(change, QuantityChange::Removed);
        assert!(store.cart_lines("user_a").await.is_empty());
    }

    #[tokio::test]
    async fn test_other_users_line_is_not_found() {
        let (store, service) = setup();
        let tour = store.seed_product("Jeju Tour", "150000").await;
        service
            .add_item(&UserId::new("user_a"), tour, Some(2))
            .await
            .unwrap();
        let line_id = store.cart_lines("user_a").await[0].id;

        let intruder = UserId::new("user_b");
        assert!(matches!(
            service.update_quantity(&intruder, line_id, 5).await,
            Err(CartError::LineNotFound(_))
        ));
        assert!(matches!(
            service.remove_item(&intruder, line_id).await,
            Err(CartError::LineNotFound(_))
        ));
        assert_eq!(store.cart_lines("user_a").await[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_list_flags_unavailable_lines() {
        let (store, service) = setup();
        let user = UserId::new("user_a");
        let tour = store.seed_product("Jeju Tour", "150000").await;
        let pillow = store.seed_product("Travel Pillow", "12000").await;
        service.add_item(&user, tour, Some(2)).await.unwrap();
        service.add_item(&user, pillow, Some(1)).await.unwrap();
        store.delete_product(pillow).await;

        let cart = service.list(&user).await.unwrap();

        assert_eq!(cart.lines.len(), 2);
        assert_eq!(cart.subtotal, Decimal::from(300000));
        assert_eq!(cart.item_count, 2);
        assert!(!cart.is_checkout_ready());
        let gone = cart.lines.iter().find(|l| l.product_id == pillow).unwrap();
        assert!(!gone.available);
        assert_eq!(gone.line_total, None);
    }
}
