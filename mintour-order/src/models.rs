use chrono::{DateTime, Duration, Utc};
use mintour_catalog::SnapshotLine;
use mintour_core::{CoreError, ShippingAddress};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the buyer submits at checkout
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(flatten)]
    pub shipping: ShippingAddress,
    #[serde(default)]
    pub order_note: Option<String>,
}

impl CheckoutRequest {
    /// Trimmed copy of the address and note, validated for minimum lengths
    pub fn normalized(&self) -> Result<(ShippingAddress, Option<String>), CoreError> {
        let shipping = ShippingAddress {
            recipient: self.shipping.recipient.expose().trim().into(),
            phone: self.shipping.phone.expose().trim().into(),
            postcode: self.shipping.postcode.trim().to_string(),
            address_line1: self.shipping.address_line1.trim().to_string(),
            address_line2: non_blank(self.shipping.address_line2.as_deref()),
        };
        shipping.validate()?;

        Ok((shipping, non_blank(self.order_note.as_deref())))
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// A freshly materialized order, ready for payment dispatch
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    pub order_id: Uuid,
    pub order_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub lines: Vec<SnapshotLine>,
}

/// Display name shown at the gateway: the first product, else a synthesized fallback
pub fn order_display_name(order_id: Uuid, first_product: Option<&str>) -> String {
    match first_product {
        Some(name) if !name.trim().is_empty() => name.to_string(),
        _ => format!("Order {order_id}"),
    }
}

/// Receiving account for bank-transfer checkouts
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct BankAccount {
    pub bank_name: String,
    pub account_number: String,
    pub account_holder: String,
    pub deposit_window_hours: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BankTransferInstructions {
    pub order_id: Uuid,
    pub bank_name: String,
    pub account_number: String,
    pub account_holder: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub deposit_deadline: DateTime<Utc>,
}

impl BankAccount {
    pub fn instructions_for(&self, draft: &OrderDraft, now: DateTime<Utc>) -> BankTransferInstructions {
        BankTransferInstructions {
            order_id: draft.order_id,
            bank_name: self.bank_name.clone(),
            account_number: self.account_number.clone(),
            account_holder: self.account_holder.clone(),
            amount: draft.total_amount,
            deposit_deadline: now + Duration::hours(i64::from(self.deposit_window_hours)),
        }
    }
}
