use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use strum::{Display, EnumString};
use tracing::{instrument, warn};

use crate::errors::ServiceError;

/// Payment-initiation request sent to the gateway.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    /// Deterministic transaction reference; repeating an initiation for the
    /// same invoice reuses the same key on the gateway side.
    pub reference: String,
    pub gross_amount: Decimal,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
}

/// Opaque client token handed to the storefront for the redirect flow.
#[derive(Debug, Clone, Deserialize)]
pub struct ChargeResponse {
    pub token: String,
    pub redirect_url: Option<String>,
}

/// Transaction states the gateway reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GatewayTransactionState {
    Capture,
    Settlement,
    Pending,
    Deny,
    Cancel,
    Expire,
}

/// Authoritative transaction record pulled from the gateway.
#[derive(Debug, Clone)]
pub struct GatewayTransaction {
    pub reference: String,
    pub state: GatewayTransactionState,
    /// Instrument the customer chose, once known (e.g. "bank_transfer").
    pub payment_type: Option<String>,
    pub settled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The gateway has no record under this reference.
    #[error("transaction not found: {0}")]
    TransactionNotFound(String),
    /// Transient transport or gateway-side failure; retry later.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
    /// The gateway answered with something this client cannot interpret.
    #[error("gateway protocol error: {0}")]
    Protocol(String),
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::TransactionNotFound(msg) => ServiceError::GatewayTransactionNotFound(msg),
            GatewayError::Unavailable(msg) => ServiceError::GatewayUnavailable(msg),
            GatewayError::Protocol(msg) => ServiceError::ExternalServiceError(msg),
        }
    }
}

/// Boundary to the external payment gateway. The gateway is untrusted and
/// asynchronous; it is only ever queried, never believed via push.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Registers a transaction and returns the client token for the
    /// redirect checkout flow.
    async fn create_transaction(
        &self,
        request: &ChargeRequest,
    ) -> Result<ChargeResponse, GatewayError>;

    /// Fetches the authoritative status of a previously initiated
    /// transaction.
    async fn fetch_transaction(&self, reference: &str)
        -> Result<GatewayTransaction, GatewayError>;
}

/// HTTP client for the gateway's REST API.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    server_key: String,
}

impl HttpPaymentGateway {
    pub fn new(
        base_url: String,
        server_key: String,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ServiceError::InternalError(format!("failed to build gateway client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            server_key,
        })
    }

    fn map_transport_error(e: reqwest::Error) -> GatewayError {
        if e.is_timeout() || e.is_connect() {
            GatewayError::Unavailable(e.to_string())
        } else {
            GatewayError::Protocol(e.to_string())
        }
    }
}

#[derive(Serialize)]
struct ChargeBody<'a> {
    reference: &'a str,
    gross_amount: Decimal,
    customer: ChargeCustomer<'a>,
}

#[derive(Serialize)]
struct ChargeCustomer<'a> {
    name: &'a str,
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<&'a str>,
}

#[derive(Deserialize)]
struct TransactionStatusBody {
    reference: String,
    transaction_status: String,
    #[serde(default)]
    payment_type: Option<String>,
    #[serde(default)]
    settlement_time: Option<DateTime<Utc>>,
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self, request), fields(reference = %request.reference))]
    async fn create_transaction(
        &self,
        request: &ChargeRequest,
    ) -> Result<ChargeResponse, GatewayError> {
        let url = format!("{}/v1/transactions", self.base_url);
        let body = ChargeBody {
            reference: &request.reference,
            gross_amount: request.gross_amount,
            customer: ChargeCustomer {
                name: &request.customer_name,
                email: &request.customer_email,
                phone: request.customer_phone.as_deref(),
            },
        };

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.server_key, Some(""))
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        match response.status() {
            status if status.is_success() => response
                .json::<ChargeResponse>()
                .await
                .map_err(|e| GatewayError::Protocol(e.to_string())),
            status if status.is_server_error() => Err(GatewayError::Unavailable(format!(
                "gateway returned {}",
                status
            ))),
            status => Err(GatewayError::Protocol(format!(
                "gateway rejected charge with {}",
                status
            ))),
        }
    }

    #[instrument(skip(self))]
    async fn fetch_transaction(
        &self,
        reference: &str,
    ) -> Result<GatewayTransaction, GatewayError> {
        let url = format!("{}/v1/transactions/{}/status", self.base_url, reference);

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.server_key, Some(""))
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(GatewayError::TransactionNotFound(format!(
                "no transaction under reference {}",
                reference
            ))),
            status if status.is_server_error() => Err(GatewayError::Unavailable(format!(
                "gateway returned {}",
                status
            ))),
            status if status.is_success() => {
                let body = response
                    .json::<TransactionStatusBody>()
                    .await
                    .map_err(|e| GatewayError::Protocol(e.to_string()))?;

                let state =
                    GatewayTransactionState::from_str(&body.transaction_status).map_err(|_| {
                        warn!(
                            transaction_status = %body.transaction_status,
                            "gateway reported a transaction status this client does not know"
                        );
                        GatewayError::Protocol(format!(
                            "unknown transaction status '{}'",
                            body.transaction_status
                        ))
                    })?;

                Ok(GatewayTransaction {
                    reference: body.reference,
                    state,
                    payment_type: body.payment_type,
                    settled_at: body.settlement_time,
                })
            }
            status => Err(GatewayError::Protocol(format!(
                "gateway status query failed with {}",
                status
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(base_url: String) -> HttpPaymentGateway {
        HttpPaymentGateway::new(base_url, "server-key".to_string(), Duration::from_millis(500))
            .expect("client builds")
    }

    fn charge_request() -> ChargeRequest {
        ChargeRequest {
            reference: "inv-123-1700000000".to_string(),
            gross_amount: dec!(320000),
            customer_name: "Siti Rahma".to_string(),
            customer_email: "siti@example.com".to_string(),
            customer_phone: Some("0812345678901".to_string()),
        }
    }

    #[tokio::test]
    async fn create_transaction_returns_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/transactions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "token": "tok_abc",
                "redirect_url": "https://pay.example/tok_abc"
            })))
            .mount(&server)
            .await;

        let result = gateway(server.uri())
            .create_transaction(&charge_request())
            .await
            .expect("charge succeeds");

        assert_eq!(result.token, "tok_abc");
        assert_eq!(
            result.redirect_url.as_deref(),
            Some("https://pay.example/tok_abc")
        );
    }

    #[tokio::test]
    async fn fetch_transaction_parses_settlement() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/transactions/inv-123-1700000000/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "reference": "inv-123-1700000000",
                "transaction_status": "settlement",
                "payment_type": "bank_transfer",
                "settlement_time": "2025-06-09T10:30:00Z"
            })))
            .mount(&server)
            .await;

        let txn = gateway(server.uri())
            .fetch_transaction("inv-123-1700000000")
            .await
            .expect("status fetch succeeds");

        assert_eq!(txn.state, GatewayTransactionState::Settlement);
        assert_eq!(txn.payment_type.as_deref(), Some("bank_transfer"));
        assert!(txn.settled_at.is_some());
    }

    #[tokio::test]
    async fn missing_transaction_maps_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = gateway(server.uri())
            .fetch_transaction("inv-unknown")
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::TransactionNotFound(_)));
    }

    #[tokio::test]
    async fn server_error_maps_to_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = gateway(server.uri())
            .fetch_transaction("inv-123")
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Unavailable(_)));
    }

    #[tokio::test]
    async fn slow_gateway_maps_to_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let err = gateway(server.uri())
            .fetch_transaction("inv-123")
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Unavailable(_)));
    }

    #[tokio::test]
    async fn unknown_status_label_is_a_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "reference": "inv-123",
                "transaction_status": "haggling"
            })))
            .mount(&server)
            .await;

        let err = gateway(server.uri())
            .fetch_transaction("inv-123")
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Protocol(_)));
    }
}
