use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mintour_core::repository::OrderRepository;
use mintour_core::{
    NewOrder, NewOrderLine, OrderLineRecord, OrderListQuery, OrderRecord, OrderStatus,
    ShippingAddress, StoreError, StoreResult,
};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db_error;

pub struct StoreOrderRepository {
    pool: PgPool,
}

impl StoreOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ORDER_COLUMNS: &str =
    "id, clerk_id, total_amount, status, shipping_address, order_note, created_at, updated_at";

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    clerk_id: String,
    total_amount: Decimal,
    status: String,
    shipping_address: Value,
    order_note: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for OrderRecord {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<OrderStatus>()
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        Ok(Self {
            id: row.id,
            clerk_id: row.clerk_id,
            total_amount: row.total_amount,
            status,
            shipping_address: decode_shipping(row.shipping_address),
            order_note: row.order_note,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Older rows may carry partial addresses; missing fields read as empty.
fn decode_shipping(value: Value) -> ShippingAddress {
    let text = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    ShippingAddress {
        recipient: text("recipient").into(),
        phone: text("phone").into(),
        postcode: text("postcode"),
        address_line1: text("addressLine1"),
        address_line2: value
            .get("addressLine2")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Option<Uuid>,
    product_name: String,
    quantity: i32,
    price: Decimal,
    created_at: DateTime<Utc>,
}

impl From<OrderItemRow> for OrderLineRecord {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            product_name: row.product_name,
            quantity: row.quantity,
            price: row.price,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl OrderRepository for StoreOrderRepository {
    async fn insert_order(&self, order: &NewOrder) -> StoreResult<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO orders (clerk_id, total_amount, status, shipping_address, order_note)
            VALUES ($1, $2, 'pending', $3, $4)
            RETURNING id
            "#,
        )
        .bind(&order.clerk_id)
        .bind(order.total_amount)
        .bind(Json(&order.shipping_address))
        .bind(&order.order_note)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(id)
    }

    async fn insert_order_lines(&self, order_id: Uuid, lines: &[NewOrderLine]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, product_id, product_name, quantity, price)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(order_id)
            .bind(line.product_id)
            .bind(&line.product_name)
            .bind(line.quantity)
            .bind(line.price)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }

        tx.commit().await.map_err(db_error)?;
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> StoreResult<Option<OrderRecord>> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

        row.map(OrderRecord::try_from).transpose()
    }

    async fn order_lines(&self, order_id: Uuid) -> StoreResult<Vec<OrderLineRecord>> {
        let rows: Vec<OrderItemRow> = sqlx::query_as(
            r#"
            SELECT id, order_id, product_id, product_name, quantity, price, created_at
            FROM order_items
            WHERE order_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(OrderLineRecord::from).collect())
    }

    async fn count_order_lines(&self, order_id: Uuid) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM order_items WHERE order_id = $1")
            .bind(order_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(count.max(0) as u64)
    }

    async fn update_status_if_current_is(
        &self,
        id: Uuid,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE orders SET status = $1, updated_at = NOW() WHERE id = $2 AND status = $3",
        )
        .bind(next.as_str())
        .bind(id)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_orders(&self, clerk_id: &str, query: &OrderListQuery) -> StoreResult<Vec<OrderRecord>> {
        let sql = format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE clerk_id = $1
              AND ($2::text IS NULL OR status = $2)
              AND ($3::timestamptz IS NULL OR (created_at, id) < ($3::timestamptz, $4::uuid))
            ORDER BY created_at DESC, id DESC
            LIMIT $5
            "#
        );

        let rows: Vec<OrderRow> = sqlx::query_as(&sql)
            .bind(clerk_id)
            .bind(query.status.map(|s| s.as_str()))
            .bind(query.before.map(|c| c.created_at))
            .bind(query.before.map(|c| c.id))
            .bind(query.limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        rows.into_iter().map(OrderRecord::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_partial_shipping_reads_as_empty_fields() {
        let address = decode_shipping(json!({ "recipient": "홍길동", "addressLine2": "101호" }));

        assert_eq!(address.recipient.expose(), "홍길동");
        assert_eq!(address.phone.expose(), "");
        assert_eq!(address.postcode, "");
        assert_eq!(address.address_line2.as_deref(), Some("101호"));
    }

    #[test]
    fn test_unknown_status_fails_decode() {
        let row = OrderRow {
            id: Uuid::new_v4(),
            clerk_id: "user_1".to_string(),
            total_amount: Decimal::from(1000),
            status: "paid".to_string(),
            shipping_address: json!({}),
            order_note: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(matches!(OrderRecord::try_from(row), Err(StoreError::Decode(_))));
    }
}
