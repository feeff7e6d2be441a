use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use mintour_core::payment::gateway_amount;
use mintour_core::{GatewayError, PaymentConfirmation, PaymentGateway, PaymentLinkRequest};
use mintour_shared::Masked;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_config::PaymentsConfig;

/// Toss Payments REST client
pub struct TossPaymentsClient {
    http: reqwest::Client,
    base_url: String,
    authorization: Masked<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentLinkResponse {
    checkout_url: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmBody<'a> {
    payment_key: &'a str,
    order_id: String,
    amount: i64,
}

#[derive(Deserialize, Default)]
struct TossErrorBody {
    code: Option<String>,
    message: Option<String>,
}

impl TossPaymentsClient {
    pub fn new(config: &PaymentsConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self::with_client(
            http,
            &config.api_base_url,
            config.secret_key.expose(),
        ))
    }

    pub fn with_client(http: reqwest::Client, base_url: &str, secret_key: &str) -> Self {
        // Basic auth with the secret key as user name and an empty password
        let token = STANDARD.encode(format!("{secret_key}:"));

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            authorization: Masked::new(format!("Basic {token}")),
        }
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, GatewayError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header(reqwest::header::AUTHORIZATION, self.authorization.expose())
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let error: TossErrorBody = serde_json::from_str(&text).unwrap_or_default();

        tracing::error!(path, status, code = ?error.code, "Gateway rejected request");

        Err(GatewayError::Rejected {
            status,
            code: error.code,
            message: error
                .message
                .unwrap_or_else(|| "Payment gateway rejected the request".to_string()),
        })
    }
}

#[async_trait]
impl PaymentGateway for TossPaymentsClient {
    async fn create_payment_link(&self, request: &PaymentLinkRequest) -> Result<String, GatewayError> {
        tracing::info!(order_id = %request.order_id, amount = request.amount, "Creating payment link");

        let response = self.post("/v1/payment-links", request).await?;
        let payload: PaymentLinkResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        payload
            .checkout_url
            .filter(|url| !url.is_empty())
            .ok_or(GatewayError::MissingCheckoutUrl)
    }

    async fn confirm_payment(
        &self,
        payment_key: &str,
        order_id: Uuid,
        amount: Decimal,
    ) -> Result<PaymentConfirmation, GatewayError> {
        let body = ConfirmBody {
            payment_key,
            order_id: order_id.to_string(),
            amount: gateway_amount(amount)?,
        };

        tracing::info!(%order_id, amount = body.amount, "Confirming payment");

        let response = self.post("/v1/payments/confirm", &body).await?;
        response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn spawn_gateway(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(base_url: &str) -> TossPaymentsClient {
        TossPaymentsClient::with_client(reqwest::Client::new(), base_url, "test_sk_abc")
    }

    fn link_request() -> PaymentLinkRequest {
        PaymentLinkRequest::new(
            Uuid::new_v4(),
            "Jeju Tour",
            Decimal::new(3000005, 1),
            "http://localhost:3000/payments/success".to_string(),
            "http://localhost:3000/payments/fail".to_string(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_payment_link_sends_basic_auth_and_rounded_amount() {
        let router = Router::new().route(
            "/v1/payment-links",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let auth = headers.get("authorization").unwrap().to_str().unwrap().to_string();
                // base64("test_sk_abc:")
                assert_eq!(auth, "Basic dGVzdF9za19hYmM6");
                assert_eq!(body["amount"], json!(300001));
                assert_eq!(body["orderName"], json!("Jeju Tour"));
                Json(json!({ "checkoutUrl": "https://pay.toss.im/link/abc" }))
            }),
        );
        let base = spawn_gateway(router).await;

        let url = client(&base).create_payment_link(&link_request()).await.unwrap();
        assert_eq!(url, "https://pay.toss.im/link/abc");
    }

    #[tokio::test]
    async fn test_missing_checkout_url_is_an_error() {
        let router = Router::new().route(
            "/v1/payment-links",
            post(|| async { Json(json!({ "status": "READY" })) }),
        );
        let base = spawn_gateway(router).await;

        let result = client(&base).create_payment_link(&link_request()).await;
        assert!(matches!(result, Err(GatewayError::MissingCheckoutUrl)));
    }

    #[tokio::test]
    async fn test_rejection_carries_gateway_code_and_message() {
        let router = Router::new().route(
            "/v1/payments/confirm",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "code": "ALREADY_PROCESSED_PAYMENT", "message": "이미 처리된 결제 입니다." })),
                )
            }),
        );
        let base = spawn_gateway(router).await;

        let result = client(&base)
            .confirm_payment("pk_1", Uuid::new_v4(), Decimal::from(300000))
            .await;

        match result {
            Err(GatewayError::Rejected { status, code, message }) => {
                assert_eq!(status, 400);
                assert_eq!(code.as_deref(), Some("ALREADY_PROCESSED_PAYMENT"));
                assert_eq!(message, "이미 처리된 결제 입니다.");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_confirm_parses_payment() {
        let order_id = Uuid::new_v4();
        let router = Router::new().route(
            "/v1/payments/confirm",
            post(|Json(body): Json<Value>| async move {
                Json(json!({
                    "paymentKey": body["paymentKey"],
                    "orderId": body["orderId"],
                    "status": "DONE",
                    "totalAmount": body["amount"],
                }))
            }),
        );
        let base = spawn_gateway(router).await;

        let confirmation = client(&base)
            .confirm_payment("pk_1", order_id, Decimal::from(300000))
            .await
            .unwrap();

        assert_eq!(confirmation.payment_key, "pk_1");
        assert_eq!(confirmation.order_id, order_id.to_string());
        assert_eq!(confirmation.total_amount, Some(300000));
        assert_eq!(confirmation.status.as_deref(), Some("DONE"));
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_transport_error() {
        let result = client("http://127.0.0.1:9")
            .confirm_payment("pk_1", Uuid::new_v4(), Decimal::from(1))
            .await;

        assert!(matches!(result, Err(GatewayError::Transport(_))));
    }
}
