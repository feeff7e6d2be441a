//! In-process implementations of the storage and gateway capabilities,
//! used by the service and router tests across the workspace.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mintour_core::payment::gateway_amount;
use mintour_core::repository::{CartRepository, OrderRepository, ProductRepository};
use mintour_core::{
    CartLine, CartProductRow, GatewayError, NewOrder, NewOrderLine, OrderLineRecord,
    OrderListQuery, OrderRecord, OrderStatus, PaymentConfirmation, PaymentGateway,
    PaymentLinkRequest, ProductRow, StoreError, StoreResult, MAX_LINE_QUANTITY,
};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct State {
    products: HashMap<Uuid, ProductRow>,
    cart: Vec<CartLine>,
    orders: Vec<OrderRecord>,
    order_lines: Vec<OrderLineRecord>,
    fail_next_line_insert: bool,
    fail_cart_deletes: bool,
    // Status a concurrent writer stores right before the next conditional update
    interfering_status: Option<OrderStatus>,
    // Every conditional update reports a lost race and writes nothing
    contended_status_updates: bool,
    // Monotonic clock so ordering by creation time is deterministic
    ticks: i64,
}

impl State {
    // Microsecond precision, like a timestamptz column
    fn now(&mut self) -> DateTime<Utc> {
        self.ticks += 1;
        let micros = Utc::now().timestamp_micros() + self.ticks * 1_000;
        DateTime::from_timestamp_micros(micros).unwrap_or_else(Utc::now)
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_product(&self, name: &str, price: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().await.products.insert(
            id,
            ProductRow {
                id,
                name: name.to_string(),
                price: Some(price.to_string()),
                is_active: true,
            },
        );
        id
    }

    pub async fn set_product_price(&self, id: Uuid, price: Option<&str>) {
        if let Some(product) = self.state.lock().await.products.get_mut(&id) {
            product.price = price.map(str::to_string);
        }
    }

    pub async fn set_product_active(&self, id: Uuid, is_active: bool) {
        if let Some(product) = self.state.lock().await.products.get_mut(&id) {
            product.is_active = is_active;
        }
    }

    pub async fn delete_product(&self, id: Uuid) {
        let mut state = self.state.lock().await;
        state.products.remove(&id);
        for line in state.order_lines.iter_mut() {
            if line.product_id == Some(id) {
                line.product_id = None;
            }
        }
    }

    /// The next `insert_order_lines` call fails after the order row exists
    pub async fn fail_next_line_insert(&self) {
        self.state.lock().await.fail_next_line_insert = true;
    }

    pub async fn fail_cart_deletes(&self, fail: bool) {
        self.state.lock().await.fail_cart_deletes = fail;
    }

    /// Simulates another writer storing `status` just before the next conditional update
    pub async fn interfere_with_next_status_update(&self, status: OrderStatus) {
        self.state.lock().await.interfering_status = Some(status);
    }

    /// While set, every conditional status update loses as if another writer
    /// touched the row first; stored statuses stay as they are
    pub async fn contend_status_updates(&self, contended: bool) {
        self.state.lock().await.contended_status_updates = contended;
    }

    /// Writes a status without any transition check
    pub async fn force_status(&self, id: Uuid, status: OrderStatus) {
        let mut state = self.state.lock().await;
        if let Some(order) = state.orders.iter_mut().find(|o| o.id == id) {
            order.status = status;
        }
    }

    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    pub async fn cart_lines(&self, clerk_id: &str) -> Vec<CartLine> {
        self.state
            .lock()
            .await
            .cart
            .iter()
            .filter(|line| line.clerk_id == clerk_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ProductRepository for InMemoryStore {
    async fn get_product(&self, id: Uuid) -> StoreResult<Option<ProductRow>> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }
}

#[async_trait]
impl CartRepository for InMemoryStore {
    async fn lines_with_products(&self, clerk_id: &str) -> StoreResult<Vec<CartProductRow>> {
        let state = self.state.lock().await;
        Ok(state
            .cart
            .iter()
            .filter(|line| line.clerk_id == clerk_id)
            .map(|line| CartProductRow {
                cart_item_id: line.id,
                product_id: line.product_id,
                quantity: line.quantity,
                product: state.products.get(&line.product_id).cloned(),
            })
            .collect())
    }

    async fn increment_quantity(
        &self,
        clerk_id: &str,
        product_id: Uuid,
        delta: i32,
    ) -> StoreResult<i32> {
        let mut state = self.state.lock().await;
        let now = state.now();

        if let Some(line) = state
            .cart
            .iter_mut()
            .find(|line| line.clerk_id == clerk_id && line.product_id == product_id)
        {
            line.quantity = line.quantity.saturating_add(delta).min(MAX_LINE_QUANTITY);
            line.updated_at = now;
            return Ok(line.quantity);
        }

        state.cart.push(CartLine {
            id: Uuid::new_v4(),
            clerk_id: clerk_id.to_string(),
            product_id,
            quantity: delta.min(MAX_LINE_QUANTITY),
            created_at: now,
            updated_at: now,
        });
        Ok(delta.min(MAX_LINE_QUANTITY))
    }

    async fn set_quantity(
        &self,
        clerk_id: &str,
        cart_item_id: Uuid,
        quantity: i32,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let now = state.now();

        match state
            .cart
            .iter_mut()
            .find(|line| line.id == cart_item_id && line.clerk_id == clerk_id)
        {
            Some(line) => {
                line.quantity = quantity;
                line.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove_line(&self, clerk_id: &str, cart_item_id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let before = state.cart.len();
        state
            .cart
            .retain(|line| !(line.id == cart_item_id && line.clerk_id == clerk_id));
        Ok(state.cart.len() < before)
    }

    async fn delete_lines(&self, cart_item_ids: &[Uuid]) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        if state.fail_cart_deletes {
            return Err(StoreError::Unavailable("cart deletes disabled".to_string()));
        }
        let before = state.cart.len();
        state.cart.retain(|line| !cart_item_ids.contains(&line.id));
        Ok((before - state.cart.len()) as u64)
    }

    async fn delete_lines_for_products(
        &self,
        clerk_id: &str,
        product_ids: &[Uuid],
    ) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        if state.fail_cart_deletes {
            return Err(StoreError::Unavailable("cart deletes disabled".to_string()));
        }
        let before = state.cart.len();
        state
            .cart
            .retain(|line| !(line.clerk_id == clerk_id && product_ids.contains(&line.product_id)));
        Ok((before - state.cart.len()) as u64)
    }

    async fn clear_for_owner(&self, clerk_id: &str) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        if state.fail_cart_deletes {
            return Err(StoreError::Unavailable("cart deletes disabled".to_string()));
        }
        let before = state.cart.len();
        state.cart.retain(|line| line.clerk_id != clerk_id);
        Ok((before - state.cart.len()) as u64)
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn insert_order(&self, order: &NewOrder) -> StoreResult<Uuid> {
        let mut state = self.state.lock().await;
        let now = state.now();
        let id = Uuid::new_v4();

        state.orders.push(OrderRecord {
            id,
            clerk_id: order.clerk_id.clone(),
            total_amount: order.total_amount,
            status: OrderStatus::Pending,
            shipping_address: order.shipping_address.clone(),
            order_note: order.order_note.clone(),
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    async fn insert_order_lines(&self, order_id: Uuid, lines: &[NewOrderLine]) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if std::mem::take(&mut state.fail_next_line_insert) {
            return Err(StoreError::Database("order_items insert failed".to_string()));
        }

        let now = state.now();
        for line in lines {
            state.order_lines.push(OrderLineRecord {
                id: Uuid::new_v4(),
                order_id,
                product_id: Some(line.product_id),
                product_name: line.product_name.clone(),
                quantity: line.quantity,
                price: line.price,
                created_at: now,
            });
        }
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> StoreResult<Option<OrderRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .orders
            .iter()
            .find(|order| order.id == id)
            .cloned())
    }

    async fn order_lines(&self, order_id: Uuid) -> StoreResult<Vec<OrderLineRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .order_lines
            .iter()
            .filter(|line| line.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn count_order_lines(&self, order_id: Uuid) -> StoreResult<u64> {
        Ok(self
            .state
            .lock()
            .await
            .order_lines
            .iter()
            .filter(|line| line.order_id == order_id)
            .count() as u64)
    }

    async fn update_status_if_current_is(
        &self,
        id: Uuid,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        if state.contended_status_updates {
            return Ok(false);
        }
        let interfering = state.interfering_status.take();
        let now = state.now();

        let Some(order) = state.orders.iter_mut().find(|order| order.id == id) else {
            return Ok(false);
        };

        if let Some(status) = interfering {
            order.status = status;
        }

        if order.status != expected {
            return Ok(false);
        }

        order.status = next;
        order.updated_at = now;
        Ok(true)
    }

    async fn list_orders(&self, clerk_id: &str, query: &OrderListQuery) -> StoreResult<Vec<OrderRecord>> {
        let state = self.state.lock().await;
        let mut orders: Vec<OrderRecord> = state
            .orders
            .iter()
            .filter(|order| order.clerk_id == clerk_id)
            .filter(|order| query.status.map_or(true, |status| order.status == status))
            .filter(|order| {
                query
                    .before
                    .map_or(true, |cursor| (order.created_at, order.id) < (cursor.created_at, cursor.id))
            })
            .cloned()
            .collect();

        orders.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        orders.truncate(query.limit);
        Ok(orders)
    }
}

/// Gateway double: answers from a script and records every call.
pub struct ScriptedGateway {
    checkout_url: Option<String>,
    rejection: Mutex<Option<(u16, String)>>,
    link_requests: Mutex<Vec<PaymentLinkRequest>>,
    confirm_calls: Mutex<Vec<(String, Uuid, i64)>>,
}

impl Default for ScriptedGateway {
    fn default() -> Self {
        Self::with_checkout_url("https://pay.toss.im/link/scripted")
    }
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_checkout_url(url: &str) -> Self {
        Self {
            checkout_url: Some(url.to_string()),
            rejection: Mutex::new(None),
            link_requests: Mutex::new(Vec::new()),
            confirm_calls: Mutex::new(Vec::new()),
        }
    }

    /// Link creation succeeds but the response has no checkout URL
    pub fn without_checkout_url() -> Self {
        Self {
            checkout_url: None,
            ..Self::default()
        }
    }

    /// Every following call is rejected with the given status and message
    pub async fn reject_with(&self, status: u16, message: &str) {
        *self.rejection.lock().await = Some((status, message.to_string()));
    }

    pub async fn link_requests(&self) -> Vec<PaymentLinkRequest> {
        self.link_requests.lock().await.clone()
    }

    pub async fn confirm_calls(&self) -> Vec<(String, Uuid, i64)> {
        self.confirm_calls.lock().await.clone()
    }

    async fn check_rejection(&self) -> Result<(), GatewayError> {
        match self.rejection.lock().await.clone() {
            Some((status, message)) => Err(GatewayError::Rejected {
                status,
                code: Some("SCRIPTED_REJECTION".to_string()),
                message,
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create_payment_link(&self, request: &PaymentLinkRequest) -> Result<String, GatewayError> {
        self.link_requests.lock().await.push(request.clone());
        self.check_rejection().await?;
        self.checkout_url.clone().ok_or(GatewayError::MissingCheckoutUrl)
    }

    async fn confirm_payment(
        &self,
        payment_key: &str,
        order_id: Uuid,
        amount: Decimal,
    ) -> Result<PaymentConfirmation, GatewayError> {
        let amount = gateway_amount(amount)?;
        self.confirm_calls
            .lock()
            .await
            .push((payment_key.to_string(), order_id, amount));
        self.check_rejection().await?;

        Ok(PaymentConfirmation {
            payment_key: payment_key.to_string(),
            order_id: order_id.to_string(),
            status: Some("DONE".to_string()),
            method: Some("CARD".to_string()),
            total_amount: Some(amount),
            approved_at: Some(Utc::now().to_rfc3339()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_increment_merges_same_product() {
        let store = InMemoryStore::new();
        let product = store.seed_product("Jeju Tour", "150000").await;

        assert_eq!(store.increment_quantity("user_a", product, 1).await.unwrap(), 1);
        assert_eq!(store.increment_quantity("user_a", product, 2).await.unwrap(), 3);
        assert_eq!(store.cart_lines("user_a").await.len(), 1);
    }

    #[tokio::test]
    async fn test_conditional_update_only_from_expected() {
        let store = InMemoryStore::new();
        let product = store.seed_product("Jeju Tour", "150000").await;
        store.increment_quantity("user_a", product, 1).await.unwrap();

        let id = store
            .insert_order(&NewOrder {
                clerk_id: "user_a".to_string(),
                total_amount: Decimal::from(150000),
                shipping_address: mintour_core::ShippingAddress {
                    recipient: "홍길동".into(),
                    phone: "01012341234".into(),
                    postcode: "12345".to_string(),
                    address_line1: "서울시 강남구".to_string(),
                    address_line2: None,
                },
                order_note: None,
            })
            .await
            .unwrap();

        assert!(!store
            .update_status_if_current_is(id, OrderStatus::Confirmed, OrderStatus::Shipped)
            .await
            .unwrap());
        assert!(store
            .update_status_if_current_is(id, OrderStatus::Pending, OrderStatus::Confirmed)
            .await
            .unwrap());

        store.interfere_with_next_status_update(OrderStatus::Cancelled).await;
        assert!(!store
            .update_status_if_current_is(id, OrderStatus::Confirmed, OrderStatus::Shipped)
            .await
            .unwrap());
        assert_eq!(
            store.get_order(id).await.unwrap().unwrap().status,
            OrderStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn test_scripted_gateway_records_and_rejects() {
        let gateway = ScriptedGateway::new();
        let order_id = Uuid::new_v4();

        gateway
            .confirm_payment("pk_1", order_id, Decimal::from(1000))
            .await
            .unwrap();
        gateway.reject_with(400, "card declined").await;
        assert!(gateway
            .confirm_payment("pk_2", order_id, Decimal::from(1000))
            .await
            .is_err());

        assert_eq!(gateway.confirm_calls().await.len(), 2);
    }
}
