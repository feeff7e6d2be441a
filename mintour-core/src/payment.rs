use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Gateway failures. The order is never touched when one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Gateway rejected the request ({status}): {message}")]
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("Gateway response did not contain a checkout URL")]
    MissingCheckoutUrl,
    #[error("Gateway unreachable: {0}")]
    Transport(String),
    #[error("Gateway response could not be read: {0}")]
    InvalidResponse(String),
    #[error("Amount {0} cannot be charged")]
    InvalidAmount(Decimal),
}

/// Amounts are charged in whole won, rounded half away from zero.
pub fn gateway_amount(amount: Decimal) -> Result<i64, GatewayError> {
    if amount.is_sign_negative() {
        return Err(GatewayError::InvalidAmount(amount));
    }
    amount
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or(GatewayError::InvalidAmount(amount))
}

/// Body of a "create payment link" call
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentLinkRequest {
    pub amount: i64,
    pub order_id: String,
    pub order_name: String,
    pub success_url: String,
    pub fail_url: String,
}

impl PaymentLinkRequest {
    pub fn new(
        order_id: Uuid,
        order_name: &str,
        amount: Decimal,
        success_url: String,
        fail_url: String,
    ) -> Result<Self, GatewayError> {
        Ok(Self {
            amount: gateway_amount(amount)?,
            order_id: order_id.to_string(),
            order_name: order_name.to_string(),
            success_url,
            fail_url,
        })
    }
}

/// What the gateway returns once a payment is confirmed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmation {
    pub payment_key: String,
    pub order_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub total_amount: Option<i64>,
    #[serde(default)]
    pub approved_at: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Returns the checkout URL the user's browser should be sent to
    async fn create_payment_link(&self, request: &PaymentLinkRequest) -> Result<String, GatewayError>;

    /// Final authorization of a payment the user approved at the gateway
    async fn confirm_payment(
        &self,
        payment_key: &str,
        order_id: Uuid,
        amount: Decimal,
    ) -> Result<PaymentConfirmation, GatewayError>;
}
