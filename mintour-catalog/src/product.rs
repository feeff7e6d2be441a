use mintour_core::ProductRow;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// A sellable product with a validated price
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub is_active: bool,
}

/// Product-related errors
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ProductError {
    #[error("Product not found: {0}")]
    NotFound(Uuid),

    #[error("Product is no longer on sale: {0}")]
    Inactive(Uuid),

    #[error("Product {product_id} has an invalid price: {raw:?}")]
    InvalidPrice {
        product_id: Uuid,
        raw: Option<String>,
    },
}

/// Coerce a stored price into a finite, non-negative amount.
///
/// Accepts plain and scientific notation. Anything else (empty, `NaN`,
/// `Infinity`, negative) is rejected.
pub fn parse_price(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let price = Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()?;

    if price.is_sign_negative() && !price.is_zero() {
        return None;
    }
    Some(price.normalize())
}

impl TryFrom<ProductRow> for Product {
    type Error = ProductError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let price = row
            .price
            .as_deref()
            .and_then(parse_price)
            .ok_or_else(|| ProductError::InvalidPrice {
                product_id: row.id,
                raw: row.price.clone(),
            })?;

        Ok(Self {
            id: row.id,
            name: row.name,
            price,
            is_active: row.is_active,
        })
    }
}

impl Product {
    /// Products that are off sale can't be put in a cart or priced into an order
    pub fn ensure_on_sale(&self) -> Result<(), ProductError> {
        if self.is_active {
            Ok(())
        } else {
            Err(ProductError::Inactive(self.id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(price: Option<&str>) -> ProductRow {
        ProductRow {
            id: Uuid::new_v4(),
            name: "Jeju Tour".to_string(),
            price: price.map(str::to_string),
            is_active: true,
        }
    }

    #[test]
    fn test_parse_price_accepts_numeric_text() {
        assert_eq!(parse_price("150000"), Some(Decimal::from(150000)));
        assert_eq!(parse_price(" 150000.00 "), Some(Decimal::from(150000)));
        assert_eq!(parse_price("1.5e5"), Some(Decimal::from(150000)));
        assert_eq!(parse_price("0"), Some(Decimal::ZERO));
    }

    #[test]
    fn test_parse_price_rejects_non_finite_and_negative() {
        assert_eq!(parse_price(""), None);
        assert_eq!(parse_price("NaN"), None);
        assert_eq!(parse_price("Infinity"), None);
        assert_eq!(parse_price("-1"), None);
        assert_eq!(parse_price("abc"), None);
    }

    #[test]
    fn test_row_without_price_is_invalid() {
        let result = Product::try_from(row(None));
        assert!(matches!(result, Err(ProductError::InvalidPrice { raw: None, .. })));
    }

    #[test]
    fn test_inactive_product_is_not_on_sale() {
        let mut inactive = row(Some("1000"));
        inactive.is_active = false;
        let product = Product::try_from(inactive).unwrap();
        assert_eq!(product.ensure_on_sale(), Err(ProductError::Inactive(product.id)));
    }
}
