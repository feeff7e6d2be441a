pub mod models;
pub mod manager;
pub mod dispatcher;
pub mod settlement;
pub mod history;

pub use models::{BankAccount, BankTransferInstructions, CheckoutRequest, OrderDraft};
pub use manager::{OrderError, OrderMaterializer};
pub use dispatcher::{
    CallbackUrls, CheckoutTarget, DispatchError, EmbeddedWidgetDispatcher, PaymentDispatcher,
    PaymentHandoff, RedirectLinkDispatcher, WidgetSession,
};
pub use settlement::{
    ConfirmOutcome, ConfirmPayment, SettlementChannel, SettlementError, SettlementReconciler,
    TransitionOutcome, WebhookAck,
};
pub use history::{HistoryError, HistoryQuery, OrderDetail, OrderHistory, OrderPage, OrderSummary};
