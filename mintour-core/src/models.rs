use chrono::{DateTime, Utc};
use mintour_shared::Masked;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::CoreError;

/// Upper bound for a single cart line's quantity
pub const MAX_LINE_QUANTITY: i32 = 999;

/// Order status in the settlement lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Forward-only transition table. Writing the same status is not a transition.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Confirmed)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
                | (OrderStatus::Confirmed, OrderStatus::Shipped)
                | (OrderStatus::Confirmed, OrderStatus::Cancelled)
                | (OrderStatus::Shipped, OrderStatus::Delivered)
        )
    }

    /// Moving to `next` undoes a verified payment and needs a refund or reversal
    pub fn reverses_payment(&self, next: OrderStatus) -> bool {
        self.is_paid() && next == OrderStatus::Cancelled
    }

    /// Payment has been verified at some point (shipping implies it).
    pub fn is_paid(&self) -> bool {
        matches!(
            self,
            OrderStatus::Confirmed | OrderStatus::Shipped | OrderStatus::Delivered
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::UnknownStatus(s.to_string()))
    }
}

/// Denormalized shipping snapshot stored on the order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub recipient: Masked<String>,
    pub phone: Masked<String>,
    pub postcode: String,
    pub address_line1: String,
    #[serde(default)]
    pub address_line2: Option<String>,
}

impl ShippingAddress {
    pub fn validate(&self) -> Result<(), CoreError> {
        let checks = [
            ("recipient", self.recipient.expose().trim(), 2),
            ("phone", self.phone.expose().trim(), 8),
            ("postcode", self.postcode.trim(), 3),
            ("addressLine1", self.address_line1.trim(), 3),
        ];

        for (field, value, min) in checks {
            if value.chars().count() < min {
                return Err(CoreError::ValidationError(format!(
                    "{field} must be at least {min} characters"
                )));
            }
        }

        Ok(())
    }
}

/// A cart line joined with the product it references, as read from storage.
///
/// `product` is `None` when the product row no longer exists. The price is kept
/// as text so it can be coerced and validated by the pricing snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct CartProductRow {
    pub cart_item_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub product: Option<ProductRow>,
}

/// Raw product row at the storage boundary
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRow {
    pub id: Uuid,
    pub name: String,
    pub price: Option<String>,
    pub is_active: bool,
}

/// One (user, product, quantity) tuple
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CartLine {
    pub id: Uuid,
    pub clerk_id: String,
    pub product_id: Uuid,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Order row to be inserted; always starts `pending`
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub clerk_id: String,
    pub total_amount: Decimal,
    pub shipping_address: ShippingAddress,
    pub order_note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewOrderLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub id: Uuid,
    pub clerk_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub shipping_address: ShippingAddress,
    pub order_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRecord {
    pub fn is_owned_by(&self, clerk_id: &str) -> bool {
        self.clerk_id == clerk_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineRecord {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub quantity: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Keyset position for paging order history (newest first)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderCursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

#[derive(Debug, Clone, Default)]
pub struct OrderListQuery {
    pub status: Option<OrderStatus>,
    pub limit: usize,
    pub before: Option<OrderCursor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> ShippingAddress {
        ShippingAddress {
            recipient: "홍길동".into(),
            phone: "01012341234".into(),
            postcode: "12345".to_string(),
            address_line1: "서울시 강남구 테헤란로".to_string(),
            address_line2: None,
        }
    }

    #[test]
    fn test_forward_transitions_only() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Confirmed));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Confirmed.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Delivered));

        assert!(!OrderStatus::Confirmed.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Confirmed));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Pending));
    }

    #[test]
    fn test_cancelling_a_paid_order_is_a_reversal() {
        assert!(OrderStatus::Confirmed.reverses_payment(OrderStatus::Cancelled));
        assert!(!OrderStatus::Pending.reverses_payment(OrderStatus::Cancelled));
        assert!(!OrderStatus::Confirmed.reverses_payment(OrderStatus::Shipped));
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("PAID".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_minimal_address_is_valid() {
        assert!(address().validate().is_ok());
    }

    #[test]
    fn test_short_fields_are_rejected() {
        let mut short_phone = address();
        short_phone.phone = "0101".into();
        assert!(short_phone.validate().is_err());

        let mut blank_recipient = address();
        blank_recipient.recipient = "  ".into();
        assert!(blank_recipient.validate().is_err());

        let mut short_line = address();
        short_line.address_line1 = "ab".to_string();
        assert!(short_line.validate().is_err());
    }
}
