use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use mintour_core::MAX_LINE_QUANTITY;

/// One cart line as shown to its owner.
///
/// Lines whose product was deleted, went off sale, or has an unusable price
/// stay visible with `available = false` and don't count toward the subtotal.
/// Checkout refuses a cart that still holds such a line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CartLineView {
    pub cart_item_id: Uuid,
    pub product_id: Uuid,
    pub product_name: Option<String>,
    pub quantity: i32,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub unit_price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub line_total: Option<Decimal>,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub lines: Vec<CartLineView>,
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
    pub item_count: i64,
}

impl CartView {
    /// Whether every line can be priced into an order
    pub fn is_checkout_ready(&self) -> bool {
        !self.lines.is_empty() && self.lines.iter().all(|line| line.available)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AddedLine {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Outcome of a quantity update
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum QuantityChange {
    Updated { quantity: i32 },
    Removed,
}

/// Requested add quantity: missing or non-positive means one
pub fn normalize_add_quantity(requested: Option<i64>) -> i32 {
    match requested {
        Some(quantity) if quantity > 0 => quantity.min(MAX_LINE_QUANTITY as i64) as i32,
        _ => 1,
    }
}
