use async_trait::async_trait;
use mintour_core::repository::CartRepository;
use mintour_core::{CartProductRow, ProductRow, StoreResult, MAX_LINE_QUANTITY};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db_error;

pub struct StoreCartRepository {
    pool: PgPool,
}

impl StoreCartRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CartJoinRow {
    cart_item_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    p_id: Option<Uuid>,
    p_name: Option<String>,
    p_price: Option<String>,
    p_is_active: Option<bool>,
}

impl From<CartJoinRow> for CartProductRow {
    fn from(row: CartJoinRow) -> Self {
        let product = match (row.p_id, row.p_name) {
            (Some(id), Some(name)) => Some(ProductRow {
                id,
                name,
                price: row.p_price,
                is_active: row.p_is_active.unwrap_or(false),
            }),
            _ => None,
        };

        Self {
            cart_item_id: row.cart_item_id,
            product_id: row.product_id,
            quantity: row.quantity,
            product,
        }
    }
}

#[async_trait]
impl CartRepository for StoreCartRepository {
    async fn lines_with_products(&self, clerk_id: &str) -> StoreResult<Vec<CartProductRow>> {
        let rows: Vec<CartJoinRow> = sqlx::query_as(
            r#"
            SELECT c.id AS cart_item_id, c.product_id, c.quantity,
                   p.id AS p_id, p.name AS p_name, p.price::text AS p_price, p.is_active AS p_is_active
            FROM cart_items c
            LEFT JOIN products p ON p.id = c.product_id
            WHERE c.clerk_id = $1
            ORDER BY c.created_at, c.id
            "#,
        )
        .bind(clerk_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(CartProductRow::from).collect())
    }

    async fn increment_quantity(
        &self,
        clerk_id: &str,
        product_id: Uuid,
        delta: i32,
    ) -> StoreResult<i32> {
        // Single statement: concurrent adds for the same (user, product) serialize on the row
        let quantity: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO cart_items (clerk_id, product_id, quantity)
            VALUES ($1, $2, LEAST($3, $4))
            ON CONFLICT (clerk_id, product_id)
            DO UPDATE SET quantity = LEAST(cart_items.quantity + EXCLUDED.quantity, $4), updated_at = NOW()
            RETURNING quantity
            "#,
        )
        .bind(clerk_id)
        .bind(product_id)
        .bind(delta)
        .bind(MAX_LINE_QUANTITY)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(quantity)
    }

    async fn set_quantity(
        &self,
        clerk_id: &str,
        cart_item_id: Uuid,
        quantity: i32,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE cart_items SET quantity = $1, updated_at = NOW() WHERE id = $2 AND clerk_id = $3",
        )
        .bind(quantity)
        .bind(cart_item_id)
        .bind(clerk_id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_line(&self, clerk_id: &str, cart_item_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND clerk_id = $2")
            .bind(cart_item_id)
            .bind(clerk_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_lines(&self, cart_item_ids: &[Uuid]) -> StoreResult<u64> {
        if cart_item_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM cart_items WHERE id = ANY($1)")
            .bind(cart_item_ids)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected())
    }

    async fn delete_lines_for_products(
        &self,
        clerk_id: &str,
        product_ids: &[Uuid],
    ) -> StoreResult<u64> {
        if product_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM cart_items WHERE clerk_id = $1 AND product_id = ANY($2)")
            .bind(clerk_id)
            .bind(product_ids)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected())
    }

    async fn clear_for_owner(&self, clerk_id: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM cart_items WHERE clerk_id = $1")
            .bind(clerk_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected())
    }
}
