use async_trait::async_trait;
use mintour_core::repository::ProductRepository;
use mintour_core::{ProductRow, StoreResult};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db_error;

pub struct StoreProductRepository {
    pool: PgPool,
}

impl StoreProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ProductTextRow {
    id: Uuid,
    name: String,
    // NUMERIC read as text; coerced by the catalog
    price: Option<String>,
    is_active: bool,
}

#[async_trait]
impl ProductRepository for StoreProductRepository {
    async fn get_product(&self, id: Uuid) -> StoreResult<Option<ProductRow>> {
        let row: Option<ProductTextRow> = sqlx::query_as(
            "SELECT id, name, price::text AS price, is_active FROM products WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(row.map(|row| ProductRow {
            id: row.id,
            name: row.name,
            price: row.price,
            is_active: row.is_active,
        }))
    }
}
