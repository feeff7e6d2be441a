use std::sync::Arc;
use std::time::Duration;

use mintour_cart::CartService;
use mintour_core::repository::{CartRepository, OrderRepository, ProductRepository};
use mintour_core::{IdentityProvider, PaymentGateway};
use mintour_order::{
    BankAccount, EmbeddedWidgetDispatcher, OrderHistory, OrderMaterializer, RedirectLinkDispatcher,
    SettlementReconciler,
};
use mintour_shared::Masked;
use mintour_store::app_config::Config;

/// Storage and gateway capabilities the services are built on
pub struct Backends {
    pub carts: Arc<dyn CartRepository>,
    pub products: Arc<dyn ProductRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub gateway: Arc<dyn PaymentGateway>,
}

#[derive(Clone)]
pub struct Settings {
    pub app_url: String,
    pub widget_client_key: String,
    pub webhook_secret: Option<Masked<String>>,
    pub sign_in_url: String,
    pub bank_account: BankAccount,
    pub request_timeout: Duration,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            app_url: config.payments.app_url.clone(),
            widget_client_key: config.payments.widget_client_key.clone(),
            webhook_secret: config.payments.webhook_secret.clone(),
            sign_in_url: config.auth.sign_in_url.clone(),
            bank_account: BankAccount {
                bank_name: config.bank_transfer.bank_name.clone(),
                account_number: config.bank_transfer.account_number.clone(),
                account_holder: config.bank_transfer.account_holder.clone(),
                deposit_window_hours: config.bank_transfer.deposit_window_hours,
            },
            request_timeout: Duration::from_secs(config.server.request_timeout_seconds),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub cart: Arc<CartService>,
    pub materializer: Arc<OrderMaterializer>,
    pub redirect: Arc<RedirectLinkDispatcher>,
    pub widget: Arc<EmbeddedWidgetDispatcher>,
    pub reconciler: Arc<SettlementReconciler>,
    pub history: Arc<OrderHistory>,
    pub orders: Arc<dyn OrderRepository>,
    pub identity: Arc<dyn IdentityProvider>,
    pub settings: Settings,
}

impl AppState {
    pub fn new(backends: Backends, identity: Arc<dyn IdentityProvider>, settings: Settings) -> Self {
        let Backends {
            carts,
            products,
            orders,
            gateway,
        } = backends;

        Self {
            cart: Arc::new(CartService::new(carts.clone(), products)),
            materializer: Arc::new(OrderMaterializer::new(carts.clone(), orders.clone())),
            redirect: Arc::new(RedirectLinkDispatcher::new(
                gateway.clone(),
                settings.app_url.clone(),
            )),
            widget: Arc::new(EmbeddedWidgetDispatcher::new(
                settings.widget_client_key.clone(),
                settings.app_url.clone(),
            )),
            reconciler: Arc::new(SettlementReconciler::new(
                orders.clone(),
                carts,
                gateway,
                settings.webhook_secret.clone(),
            )),
            history: Arc::new(OrderHistory::new(orders.clone())),
            orders,
            identity,
            settings,
        }
    }
}
