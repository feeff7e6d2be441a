//! Settlement reconciliation.
//!
//! Three channels report payment outcomes: the browser returning from the
//! gateway (redirect-confirm), the gateway's webhook, and an operator settling
//! a bank transfer by hand. They arrive in any order, any number of times, and
//! all of them funnel through [`SettlementReconciler::transition`], which only
//! ever writes with a conditional update on the status it just read.

use std::fmt;
use std::sync::Arc;

use mintour_core::repository::{CartRepository, OrderRepository};
use mintour_core::{
    GatewayError, OrderLineRecord, OrderStatus, PaymentConfirmation, PaymentGateway, StoreError,
    UserId,
};
use mintour_shared::Masked;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Conditional writes lost to a concurrent writer before giving up
const MAX_TRANSITION_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementChannel {
    RedirectConfirm,
    Webhook,
    Manual,
}

impl fmt::Display for SettlementChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SettlementChannel::RedirectConfirm => "redirect_confirm",
            SettlementChannel::Webhook => "webhook",
            SettlementChannel::Manual => "manual",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("Order not found: {0}")]
    NotFound(Uuid),

    #[error("Unknown order reference: {0}")]
    UnknownOrder(String),

    #[error("Amount {provided} does not match order {order_id} total {expected}")]
    AmountMismatch {
        order_id: Uuid,
        expected: Decimal,
        provided: Decimal,
    },

    #[error("Order {0} has no lines and can't be confirmed")]
    IncompleteOrder(Uuid),

    #[error("Order {order_id} is {status} and can no longer be paid")]
    NotPayable { order_id: Uuid, status: OrderStatus },

    #[error("Order {order_id} is {current}; refusing to set {requested}")]
    Conflict {
        order_id: Uuid,
        current: OrderStatus,
        requested: OrderStatus,
    },

    #[error("Order {0} kept changing under concurrent updates")]
    Contended(Uuid),

    #[error("Invalid settlement request: {0}")]
    InvalidRequest(String),

    #[error("Webhook secret did not match")]
    Unauthorized,

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Result of one pass through the transition guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied { from: OrderStatus, to: OrderStatus },
    /// The order already had the requested status
    AlreadyApplied(OrderStatus),
    /// The write would break the forward-only rule; the stored status wins
    Conflict {
        current: OrderStatus,
        requested: OrderStatus,
    },
}

/// Redirect-confirm input: what the browser brings back from the gateway
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPayment {
    pub payment_key: String,
    pub order_id: Uuid,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum ConfirmOutcome {
    #[serde(rename_all = "camelCase")]
    Confirmed {
        order_id: Uuid,
        payment: PaymentConfirmation,
    },
    /// Some earlier signal already settled the order as paid
    #[serde(rename_all = "camelCase")]
    AlreadyConfirmed { order_id: Uuid, status: OrderStatus },
}

/// Webhook acknowledgement. Every variant is a 2xx for the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum WebhookAck {
    #[serde(rename_all = "camelCase")]
    Applied { order_id: Uuid, status: OrderStatus },
    #[serde(rename_all = "camelCase")]
    AlreadyApplied { order_id: Uuid, status: OrderStatus },
    /// Status outside the known vocabulary
    Ignored { status: String },
    /// The order exists but can't be confirmed (no lines)
    #[serde(rename_all = "camelCase")]
    Refused { order_id: Uuid },
    #[serde(rename_all = "camelCase")]
    Conflict {
        order_id: Uuid,
        current: OrderStatus,
        requested: OrderStatus,
    },
}

/// Parsed webhook body. Fields may sit at the top level or under `data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookNotification {
    pub order_id: String,
    pub status: String,
}

impl WebhookNotification {
    pub fn from_payload(payload: &Value) -> Result<Self, SettlementError> {
        let field = |name: &str| {
            payload
                .get(name)
                .and_then(Value::as_str)
                .or_else(|| payload.get("data")?.get(name)?.as_str())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        match (field("orderId"), field("status")) {
            (Some(order_id), Some(status)) => Ok(Self { order_id, status }),
            _ => Err(SettlementError::InvalidRequest(
                "webhook payload needs orderId and status".to_string(),
            )),
        }
    }
}

/// Gateway status vocabulary. Unknown values map to `None` and are ignored.
pub fn map_gateway_status(status: &str) -> Option<OrderStatus> {
    match status {
        "DONE" | "PAYMENT_STATUS_DONE" => Some(OrderStatus::Confirmed),
        "CANCELED" | "PAYMENT_STATUS_CANCELED" | "PAYMENT_STATUS_CANCELLED" | "ABORTED"
        | "EXPIRED" => Some(OrderStatus::Cancelled),
        _ => None,
    }
}

pub struct SettlementReconciler {
    orders: Arc<dyn OrderRepository>,
    carts: Arc<dyn CartRepository>,
    gateway: Arc<dyn PaymentGateway>,
    webhook_secret: Option<Masked<String>>,
}

impl SettlementReconciler {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        carts: Arc<dyn CartRepository>,
        gateway: Arc<dyn PaymentGateway>,
        webhook_secret: Option<Masked<String>>,
    ) -> Self {
        Self {
            orders,
            carts,
            gateway,
            webhook_secret,
        }
    }

    /// The only place order status is written.
    ///
    /// Reads the current status, decides, then writes conditioned on what was
    /// read. Losing the conditional write to another channel means re-reading
    /// and deciding again.
    pub async fn transition(
        &self,
        order_id: Uuid,
        next: OrderStatus,
        channel: SettlementChannel,
    ) -> Result<TransitionOutcome, SettlementError> {
        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            let current = self
                .orders
                .get_order(order_id)
                .await?
                .ok_or(SettlementError::NotFound(order_id))?
                .status;

            if current == next {
                tracing::debug!(%order_id, %channel, status = %current, "Status already applied");
                return Ok(TransitionOutcome::AlreadyApplied(current));
            }

            if !current.can_transition_to(next) {
                tracing::warn!(
                    %order_id,
                    %channel,
                    from = %current,
                    to = %next,
                    manual_review = true,
                    "Refusing status transition"
                );
                return Ok(TransitionOutcome::Conflict {
                    current,
                    requested: next,
                });
            }

            if next == OrderStatus::Confirmed && self.orders.count_order_lines(order_id).await? == 0 {
                tracing::warn!(%order_id, %channel, manual_review = true, "Refusing to confirm order without lines");
                return Err(SettlementError::IncompleteOrder(order_id));
            }

            if self
                .orders
                .update_status_if_current_is(order_id, current, next)
                .await?
            {
                if current.reverses_payment(next) {
                    tracing::warn!(
                        %order_id,
                        %channel,
                        from = %current,
                        to = %next,
                        manual_review = true,
                        "Paid order cancelled"
                    );
                } else {
                    tracing::info!(%order_id, %channel, from = %current, to = %next, "Order status updated");
                }
                return Ok(TransitionOutcome::Applied {
                    from: current,
                    to: next,
                });
            }

            tracing::debug!(%order_id, %channel, "Status changed concurrently, re-reading");
        }

        tracing::error!(%order_id, %channel, to = %next, "Gave up on contended status update");
        Err(SettlementError::Contended(order_id))
    }

    /// Redirect-confirm channel: owner-checked, amount-checked, then the gateway
    /// authorizes and the order moves to `confirmed`.
    pub async fn confirm(
        &self,
        user: &UserId,
        request: &ConfirmPayment,
    ) -> Result<ConfirmOutcome, SettlementError> {
        let order_id = request.order_id;
        let payment_key = request.payment_key.trim();
        if payment_key.is_empty() {
            return Err(SettlementError::InvalidRequest("paymentKey is required".to_string()));
        }

        // Another user's order reads exactly like a missing one
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .filter(|order| order.is_owned_by(user.as_str()))
            .ok_or(SettlementError::NotFound(order_id))?;

        if order.total_amount != request.amount {
            tracing::warn!(
                %order_id,
                clerk_id = %user,
                expected = %order.total_amount,
                provided = %request.amount,
                manual_review = true,
                "Payment amount mismatch"
            );
            return Err(SettlementError::AmountMismatch {
                order_id,
                expected: order.total_amount,
                provided: request.amount,
            });
        }

        if order.status.is_paid() {
            return Ok(ConfirmOutcome::AlreadyConfirmed {
                order_id,
                status: order.status,
            });
        }

        if order.status == OrderStatus::Cancelled {
            return Err(SettlementError::NotPayable {
                order_id,
                status: order.status,
            });
        }

        let lines = self.orders.order_lines(order_id).await?;
        if lines.is_empty() {
            tracing::warn!(%order_id, manual_review = true, "Confirm requested for order without lines");
            return Err(SettlementError::IncompleteOrder(order_id));
        }

        let payment = match self
            .gateway
            .confirm_payment(payment_key, order_id, order.total_amount)
            .await
        {
            Ok(payment) => payment,
            Err(e) => {
                // A duplicate confirm or the webhook may have settled the order meanwhile
                let settled = self
                    .orders
                    .get_order(order_id)
                    .await?
                    .map(|order| order.status)
                    .filter(OrderStatus::is_paid);
                if let Some(status) = settled {
                    tracing::info!(%order_id, clerk_id = %user, error = %e, "Gateway refused a repeat confirmation of a paid order");
                    self.clear_confirmed_lines(user, order_id, &lines).await;
                    return Ok(ConfirmOutcome::AlreadyConfirmed { order_id, status });
                }

                tracing::warn!(%order_id, clerk_id = %user, error = %e, "Gateway refused confirmation");
                return Err(e.into());
            }
        };

        match self
            .transition(order_id, OrderStatus::Confirmed, SettlementChannel::RedirectConfirm)
            .await?
        {
            TransitionOutcome::Applied { .. } | TransitionOutcome::AlreadyApplied(_) => {}
            TransitionOutcome::Conflict { current, requested } => {
                // Money moved at the gateway but the order went elsewhere meanwhile
                tracing::error!(
                    %order_id,
                    clerk_id = %user,
                    payment_key = %payment.payment_key,
                    status = %current,
                    manual_review = true,
                    "Payment approved for an order that can no longer be confirmed"
                );
                return Err(SettlementError::Conflict {
                    order_id,
                    current,
                    requested,
                });
            }
        }

        self.clear_confirmed_lines(user, order_id, &lines).await;

        Ok(ConfirmOutcome::Confirmed { order_id, payment })
    }

    /// Drops the buyer's cart lines for the products of a paid order
    async fn clear_confirmed_lines(&self, user: &UserId, order_id: Uuid, lines: &[OrderLineRecord]) {
        let product_ids: Vec<Uuid> = lines.iter().filter_map(|line| line.product_id).collect();
        if let Err(e) = self
            .carts
            .delete_lines_for_products(user.as_str(), &product_ids)
            .await
        {
            tracing::warn!(%order_id, clerk_id = %user, error = %e, "Order confirmed but cart lines remain");
        }
    }

    /// Webhook channel. System-to-system: no user check, only the shared secret.
    pub async fn handle_webhook(
        &self,
        payload: &Value,
        provided_secret: Option<&str>,
    ) -> Result<WebhookAck, SettlementError> {
        self.verify_webhook_secret(provided_secret)?;

        let notification = WebhookNotification::from_payload(payload)?;
        let Some(next) = map_gateway_status(&notification.status) else {
            tracing::info!(order_id = %notification.order_id, status = %notification.status, "Ignoring webhook status");
            return Ok(WebhookAck::Ignored {
                status: notification.status,
            });
        };

        let order_id = Uuid::parse_str(&notification.order_id)
            .map_err(|_| SettlementError::UnknownOrder(notification.order_id.clone()))?;
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or(SettlementError::NotFound(order_id))?;

        let outcome = match self
            .transition(order_id, next, SettlementChannel::Webhook)
            .await
        {
            Ok(outcome) => outcome,
            Err(SettlementError::IncompleteOrder(_)) => return Ok(WebhookAck::Refused { order_id }),
            Err(e) => return Err(e),
        };

        match outcome {
            TransitionOutcome::Applied { to, .. } => {
                if to == OrderStatus::Confirmed {
                    match self.carts.clear_for_owner(&order.clerk_id).await {
                        Ok(removed) => tracing::debug!(%order_id, removed, "Owner cart cleared"),
                        Err(e) => tracing::warn!(%order_id, error = %e, "Order confirmed but cart could not be cleared"),
                    }
                }
                Ok(WebhookAck::Applied { order_id, status: to })
            }
            TransitionOutcome::AlreadyApplied(status) => {
                Ok(WebhookAck::AlreadyApplied { order_id, status })
            }
            TransitionOutcome::Conflict { current, requested } => Ok(WebhookAck::Conflict {
                order_id,
                current,
                requested,
            }),
        }
    }

    /// Operator channel for bank transfers: confirm a received deposit or cancel
    pub async fn settle_manually(
        &self,
        order_id: Uuid,
        next: OrderStatus,
    ) -> Result<TransitionOutcome, SettlementError> {
        if !matches!(next, OrderStatus::Confirmed | OrderStatus::Cancelled) {
            return Err(SettlementError::InvalidRequest(format!(
                "manual settlement can only confirm or cancel, not {next}"
            )));
        }

        match self
            .transition(order_id, next, SettlementChannel::Manual)
            .await?
        {
            TransitionOutcome::Conflict { current, requested } => Err(SettlementError::Conflict {
                order_id,
                current,
                requested,
            }),
            outcome => Ok(outcome),
        }
    }

    fn verify_webhook_secret(&self, provided: Option<&str>) -> Result<(), SettlementError> {
        let Some(expected) = &self.webhook_secret else {
            return Ok(());
        };

        let matches = provided
            .map(|provided| bool::from(provided.as_bytes().ct_eq(expected.expose().as_bytes())))
            .unwrap_or(false);

        if matches {
            Ok(())
        } else {
            tracing::warn!("Webhook rejected: secret mismatch");
            Err(SettlementError::Unauthorized)
        }
    }
}
