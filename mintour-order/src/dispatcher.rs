use std::sync::Arc;

use async_trait::async_trait;
use mintour_core::payment::gateway_amount;
use mintour_core::repository::OrderRepository;
use mintour_core::{GatewayError, OrderStatus, PaymentGateway, PaymentLinkRequest, StoreError, UserId};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{order_display_name, OrderDraft};

const CUSTOMER_KEY_MIN: usize = 2;
const CUSTOMER_KEY_MAX: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Payment widget can't be initialized: {0}")]
    WidgetInit(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Order not found: {0}")]
    NotFound(Uuid),

    #[error("Order {order_id} is {status} and can't be paid")]
    NotPayable { order_id: Uuid, status: OrderStatus },

    #[error("Order {0} has no lines")]
    IncompleteOrder(Uuid),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// What a strategy needs to know about the order being paid
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutTarget {
    pub order_id: Uuid,
    pub order_name: String,
    pub amount: Decimal,
}

impl From<&OrderDraft> for CheckoutTarget {
    fn from(draft: &OrderDraft) -> Self {
        Self {
            order_id: draft.order_id,
            order_name: draft.order_name.clone(),
            amount: draft.total_amount,
        }
    }
}

impl CheckoutTarget {
    /// Re-dispatch an existing order: it must belong to the caller, still be
    /// `pending`, and have lines.
    pub async fn for_pending_order(
        orders: &dyn OrderRepository,
        user: &UserId,
        order_id: Uuid,
    ) -> Result<Self, DispatchError> {
        let order = orders
            .get_order(order_id)
            .await?
            .filter(|order| order.is_owned_by(user.as_str()))
            .ok_or(DispatchError::NotFound(order_id))?;

        if order.status != OrderStatus::Pending {
            return Err(DispatchError::NotPayable {
                order_id,
                status: order.status,
            });
        }

        let lines = orders.order_lines(order_id).await?;
        let Some(first) = lines.first() else {
            return Err(DispatchError::IncompleteOrder(order_id));
        };

        Ok(Self {
            order_id,
            order_name: order_display_name(order_id, Some(first.product_name.as_str())),
            amount: order.total_amount,
        })
    }
}

/// Success and fail return addresses; both carry the order id
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CallbackUrls {
    pub success_url: String,
    pub fail_url: String,
}

impl CallbackUrls {
    pub fn for_order(app_url: &str, order_id: Uuid) -> Self {
        let base = app_url.trim_end_matches('/');
        Self {
            success_url: format!("{base}/payments/success?orderId={order_id}"),
            fail_url: format!("{base}/payments/fail?orderId={order_id}"),
        }
    }
}

/// Everything the browser needs to render the embedded payment widget
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WidgetSession {
    pub client_key: String,
    pub customer_key: String,
    pub amount: i64,
    pub currency: String,
    pub variant_key: String,
    pub selector: String,
    pub order_id: Uuid,
    pub order_name: String,
    #[serde(flatten)]
    pub callbacks: CallbackUrls,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PaymentHandoff {
    #[serde(rename_all = "camelCase")]
    Redirect { order_id: Uuid, checkout_url: String },
    Widget(WidgetSession),
}

/// A way of handing an order to the gateway. Never touches order status.
#[async_trait]
pub trait PaymentDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        user: &UserId,
        target: &CheckoutTarget,
    ) -> Result<PaymentHandoff, DispatchError>;
}

/// Creates a hosted payment link and sends the browser there
pub struct RedirectLinkDispatcher {
    gateway: Arc<dyn PaymentGateway>,
    app_url: String,
}

impl RedirectLinkDispatcher {
    pub fn new(gateway: Arc<dyn PaymentGateway>, app_url: impl Into<String>) -> Self {
        Self {
            gateway,
            app_url: app_url.into(),
        }
    }
}

#[async_trait]
impl PaymentDispatcher for RedirectLinkDispatcher {
    async fn dispatch(
        &self,
        user: &UserId,
        target: &CheckoutTarget,
    ) -> Result<PaymentHandoff, DispatchError> {
        let callbacks = CallbackUrls::for_order(&self.app_url, target.order_id);
        let request = PaymentLinkRequest::new(
            target.order_id,
            &target.order_name,
            target.amount,
            callbacks.success_url,
            callbacks.fail_url,
        )?;

        let checkout_url = self.gateway.create_payment_link(&request).await.map_err(|e| {
            tracing::warn!(order_id = %target.order_id, clerk_id = %user, error = %e, "Payment link creation failed");
            e
        })?;

        tracing::info!(order_id = %target.order_id, clerk_id = %user, "Payment link created");

        Ok(PaymentHandoff::Redirect {
            order_id: target.order_id,
            checkout_url,
        })
    }
}

/// Renders the gateway's widget in-page; the browser requests payment itself
pub struct EmbeddedWidgetDispatcher {
    client_key: String,
    app_url: String,
}

impl EmbeddedWidgetDispatcher {
    pub fn new(client_key: impl Into<String>, app_url: impl Into<String>) -> Self {
        Self {
            client_key: client_key.into(),
            app_url: app_url.into(),
        }
    }

    /// Widget keys are `test_gck_`/`live_gck_`; the hosted-checkout keys
    /// (`test_ck_`/`live_ck_`) don't work with the widget.
    pub fn check_client_key(&self) -> Result<&str, DispatchError> {
        let key = self.client_key.trim();
        if key.is_empty() {
            return Err(DispatchError::WidgetInit("client key is empty".to_string()));
        }
        if key.starts_with("test_ck_") || key.starts_with("live_ck_") {
            return Err(DispatchError::WidgetInit(
                "a checkout key was configured; the widget needs a widget client key (test_gck_/live_gck_)"
                    .to_string(),
            ));
        }
        if !(key.starts_with("test_gck_") || key.starts_with("live_gck_")) {
            return Err(DispatchError::WidgetInit(
                "client key must start with test_gck_ or live_gck_".to_string(),
            ));
        }
        Ok(key)
    }
}

#[async_trait]
impl PaymentDispatcher for EmbeddedWidgetDispatcher {
    async fn dispatch(
        &self,
        user: &UserId,
        target: &CheckoutTarget,
    ) -> Result<PaymentHandoff, DispatchError> {
        let client_key = self.check_client_key()?.to_string();

        Ok(PaymentHandoff::Widget(WidgetSession {
            client_key,
            customer_key: customer_key_for(user),
            amount: gateway_amount(target.amount)?,
            currency: "KRW".to_string(),
            variant_key: "DEFAULT".to_string(),
            selector: "#payment-widget".to_string(),
            order_id: target.order_id,
            order_name: target.order_name.clone(),
            callbacks: CallbackUrls::for_order(&self.app_url, target.order_id),
        }))
    }
}

/// Deterministic gateway customer key for a user: allowed characters only, 2 to 50 long
pub fn customer_key_for(user: &UserId) -> String {
    let mut key: String = user
        .as_str()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '=' | '.' | '@') {
                c
            } else {
                '_'
            }
        })
        .take(CUSTOMER_KEY_MAX)
        .collect();

    while key.len() < CUSTOMER_KEY_MIN {
        key.insert(0, '_');
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use mintour_store::{InMemoryStore, ScriptedGateway};

    fn target() -> CheckoutTarget {
        CheckoutTarget {
            order_id: Uuid::new_v4(),
            order_name: "Jeju Tour".to_string(),
            amount: Decimal::from(300000),
        }
    }

    #[test]
    fn test_callback_urls_embed_order_id() {
        let id = Uuid::new_v4();
        let urls = CallbackUrls::for_order("https://shop.example/", id);
        assert_eq!(urls.success_url, format!("https://shop.example/payments/success?orderId={id}"));
        assert_eq!(urls.fail_url, format!("https://shop.example/payments/fail?orderId={id}"));
    }

    #[test]
    fn test_customer_key_is_sanitized_and_bounded() {
        assert_eq!(customer_key_for(&UserId::new("user_2abc")), "user_2abc");
        assert_eq!(customer_key_for(&UserId::new("a b/c")), "a_b_c");
        assert_eq!(customer_key_for(&UserId::new("x")), "_x");
        assert_eq!(customer_key_for(&UserId::new(&"u".repeat(80))).len(), 50);
        assert_eq!(
            customer_key_for(&UserId::new("same")),
            customer_key_for(&UserId::new("same"))
        );
    }

    #[tokio::test]
    async fn test_redirect_dispatch_returns_checkout_url() {
        let gateway = Arc::new(ScriptedGateway::with_checkout_url("https://pay.toss.im/abc"));
        let dispatcher = RedirectLinkDispatcher::new(gateway.clone(), "http://localhost:3000");
        let target = target();

        let handoff = dispatcher
            .dispatch(&UserId::new("user_a"), &target)
            .await
            .unwrap();

        assert_eq!(
            handoff,
            PaymentHandoff::Redirect {
                order_id: target.order_id,
                checkout_url: "https://pay.toss.im/abc".to_string()
            }
        );
        let requests = gateway.link_requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].amount, 300000);
        assert!(requests[0].success_url.contains(&target.order_id.to_string()));
    }

    #[tokio::test]
    async fn test_missing_checkout_url_is_gateway_error() {
        let dispatcher = RedirectLinkDispatcher::new(
            Arc::new(ScriptedGateway::without_checkout_url()),
            "http://localhost:3000",
        );

        let result = dispatcher.dispatch(&UserId::new("user_a"), &target()).await;
        assert!(matches!(
            result,
            Err(DispatchError::Gateway(GatewayError::MissingCheckoutUrl))
        ));
    }

    #[tokio::test]
    async fn test_widget_rejects_checkout_key_before_anything() {
        for key in ["test_ck_abc", "live_ck_abc", "", "   ", "gck_abc"] {
            let dispatcher = EmbeddedWidgetDispatcher::new(key, "http://localhost:3000");
            let result = dispatcher.dispatch(&UserId::new("user_a"), &target()).await;
            assert!(matches!(result, Err(DispatchError::WidgetInit(_))), "{key}");
        }
    }

    #[tokio::test]
    async fn test_widget_session_carries_render_target() {
        let dispatcher = EmbeddedWidgetDispatcher::new(" test_gck_abc ", "http://localhost:3000");
        let target = target();

        let handoff = dispatcher
            .dispatch(&UserId::new("user_a"), &target)
            .await
            .unwrap();

        let PaymentHandoff::Widget(session) = handoff else {
            panic!("expected a widget session");
        };
        assert_eq!(session.client_key, "test_gck_abc");
        assert_eq!(session.customer_key, "user_a");
        assert_eq!(session.amount, 300000);
        assert_eq!(session.currency, "KRW");
        assert_eq!(session.order_id, target.order_id);
    }

    async fn pending_order(store: &Arc<InMemoryStore>) -> Uuid {
        let tour = store.seed_product("Jeju Tour", "150000").await;
        mintour_core::CartRepository::increment_quantity(store.as_ref(), "user_a", tour, 2)
            .await
            .unwrap();
        let request = serde_json::from_value(serde_json::json!({
            "recipient": "홍길동",
            "phone": "01012345678",
            "postcode": "63000",
            "addressLine1": "제주시 첨단로 242"
        }))
        .unwrap();

        crate::OrderMaterializer::new(store.clone(), store.clone())
            .materialize(&UserId::new("user_a"), &request, false)
            .await
            .unwrap()
            .order_id
    }

    #[tokio::test]
    async fn test_redispatch_target_for_owned_pending_order() {
        let store = Arc::new(InMemoryStore::new());
        let order_id = pending_order(&store).await;

        let target = CheckoutTarget::for_pending_order(store.as_ref(), &UserId::new("user_a"), order_id)
            .await
            .unwrap();

        assert_eq!(target.order_name, "Jeju Tour");
        assert_eq!(target.amount, Decimal::from(300000));
    }

    #[tokio::test]
    async fn test_redispatch_hides_other_users_orders() {
        let store = Arc::new(InMemoryStore::new());
        let order_id = pending_order(&store).await;

        let result =
            CheckoutTarget::for_pending_order(store.as_ref(), &UserId::new("user_b"), order_id).await;
        assert!(matches!(result, Err(DispatchError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_redispatch_refuses_settled_and_incomplete_orders() {
        let store = Arc::new(InMemoryStore::new());
        let user = UserId::new("user_a");

        let cancelled = pending_order(&store).await;
        store.force_status(cancelled, OrderStatus::Cancelled).await;
        assert!(matches!(
            CheckoutTarget::for_pending_order(store.as_ref(), &user, cancelled).await,
            Err(DispatchError::NotPayable { status: OrderStatus::Cancelled, .. })
        ));

        store.fail_next_line_insert().await;
        let tour = store.seed_product("Jeju Tour", "150000").await;
        mintour_core::CartRepository::increment_quantity(store.as_ref(), "user_a", tour, 1)
            .await
            .unwrap();
        let request = serde_json::from_value(serde_json::json!({
            "recipient": "홍길동",
            "phone": "01012345678",
            "postcode": "63000",
            "addressLine1": "제주시 첨단로 242"
        }))
        .unwrap();
        let _ = crate::OrderMaterializer::new(store.clone(), store.clone())
            .materialize(&user, &request, false)
            .await;
        let orders = mintour_core::OrderRepository::list_orders(
            store.as_ref(),
            "user_a",
            &mintour_core::OrderListQuery { limit: 10, ..Default::default() },
        )
        .await
        .unwrap();
        let incomplete = orders
            .iter()
            .find(|order| order.id != cancelled)
            .map(|order| order.id)
            .unwrap();

        assert!(matches!(
            CheckoutTarget::for_pending_order(store.as_ref(), &user, incomplete).await,
            Err(DispatchError::IncompleteOrder(_))
        ));
    }
}
