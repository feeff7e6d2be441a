use chrono::{DateTime, Utc};
use mintour_core::{CartProductRow, CartRepository, StoreError, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::product::{Product, ProductError};

/// One cart line priced at snapshot time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotLine {
    pub cart_item_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub line_total: Decimal,
}

/// Frozen prices for every line in a user's cart.
///
/// Read-only: capturing a snapshot never writes to storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PricingSnapshot {
    pub lines: Vec<SnapshotLine>,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Cart line {cart_item_id} references an invalid product: {reason}")]
    InvalidProduct {
        cart_item_id: Uuid,
        reason: ProductError,
    },

    #[error("Cart line {cart_item_id} has quantity {quantity}")]
    InvalidQuantity { cart_item_id: Uuid, quantity: i32 },

    #[error("Order total overflowed")]
    TotalOverflow,

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl PricingSnapshot {
    /// Read the user's cart joined with current product prices and freeze them
    pub async fn capture(
        carts: &dyn CartRepository,
        user: &UserId,
    ) -> Result<Self, SnapshotError> {
        let rows = carts.lines_with_products(user.as_str()).await?;
        let snapshot = Self::from_rows(rows)?;

        tracing::debug!(
            clerk_id = %user,
            lines = snapshot.lines.len(),
            total = %snapshot.total,
            "Pricing snapshot captured"
        );
        Ok(snapshot)
    }

    /// Price every row. A single bad line fails the whole snapshot.
    pub fn from_rows(rows: Vec<CartProductRow>) -> Result<Self, SnapshotError> {
        if rows.is_empty() {
            return Err(SnapshotError::EmptyCart);
        }

        let mut total = Decimal::ZERO;
        let mut lines = Vec::with_capacity(rows.len());

        for row in rows {
            let line = price_line(row)?;
            total = total
                .checked_add(line.line_total)
                .ok_or(SnapshotError::TotalOverflow)?;
            lines.push(line);
        }

        Ok(Self {
            lines,
            total,
            captured_at: Utc::now(),
        })
    }

    pub fn cart_item_ids(&self) -> Vec<Uuid> {
        self.lines.iter().map(|line| line.cart_item_id).collect()
    }
}

fn price_line(row: CartProductRow) -> Result<SnapshotLine, SnapshotError> {
    let cart_item_id = row.cart_item_id;
    let invalid = |reason| SnapshotError::InvalidProduct { cart_item_id, reason };

    if row.quantity <= 0 {
        return Err(SnapshotError::InvalidQuantity {
            cart_item_id,
            quantity: row.quantity,
        });
    }

    let product_row = row
        .product
        .ok_or_else(|| invalid(ProductError::NotFound(row.product_id)))?;
    let product = Product::try_from(product_row).map_err(invalid)?;
    product.ensure_on_sale().map_err(invalid)?;

    let line_total = product
        .price
        .checked_mul(Decimal::from(row.quantity))
        .ok_or(SnapshotError::TotalOverflow)?;

    Ok(SnapshotLine {
        cart_item_id,
        product_id: product.id,
        product_name: product.name,
        quantity: row.quantity,
        unit_price: product.price,
        line_total,
    })
}
