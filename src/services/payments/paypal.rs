use super::{CaptureOutcome, GatewayOrder, PaymentGateway};
use crate::config::PayPalConfig;
use crate::errors::ServiceError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Refresh the cached token this long before it actually expires.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// PayPal Orders v2 client.
///
/// Holds a client-credentials token behind an RwLock and refreshes it when
/// it nears expiry. All failures map to `GatewayError` except a capture
/// that completes with a non-COMPLETED status, which is `PaymentFailed`.
pub struct PayPalClient {
    http: reqwest::Client,
    config: PayPalConfig,
    token: RwLock<Option<CachedToken>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    rel: String,
}

#[derive(Debug, Deserialize)]
struct CaptureResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(alias = "error_description", alias = "message")]
    error: Option<String>,
}

impl PayPalClient {
    pub fn new(config: PayPalConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {}", e)))?;
        Ok(Self {
            http,
            config,
            token: RwLock::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, ServiceError> {
        if let Some(cached) = self.token.read().await.as_ref() {
            if cached.expires_at > Instant::now() {
                return Ok(cached.access_token.clone());
            }
        }

        debug!("fetching new PayPal access token");
        let response = self
            .http
            .post(format!("{}/v1/oauth2/token", self.config.api_base()))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(network_error)?;

        if !response.status().is_success() {
            return Err(error_from_response("token request", response).await);
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|_| malformed("token response"))?;

        let expires_at = Instant::now() + Duration::from_secs(body.expires_in)
            - TOKEN_EXPIRY_MARGIN.min(Duration::from_secs(body.expires_in));
        let token = body.access_token;
        *self.token.write().await = Some(CachedToken {
            access_token: token.clone(),
            expires_at,
        });
        Ok(token)
    }
}

#[async_trait]
impl PaymentGateway for PayPalClient {
    #[instrument(skip(self))]
    async fn create_order(
        &self,
        amount: Decimal,
        currency: &str,
        reference: &str,
    ) -> Result<GatewayOrder, ServiceError> {
        let token = self.access_token().await?;

        let payload = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": reference,
                "amount": {
                    "currency_code": currency,
                    "value": format!("{:.2}", amount),
                }
            }]
        });

        let response = self
            .http
            .post(format!("{}/v2/checkout/orders", self.config.api_base()))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(network_error)?;

        if !response.status().is_success() {
            return Err(error_from_response("order create", response).await);
        }

        let body: OrderResponse = response
            .json()
            .await
            .map_err(|_| malformed("order create response"))?;

        let approve_url = body
            .links
            .into_iter()
            .find(|link| link.rel == "approve")
            .map(|link| link.href);

        Ok(GatewayOrder {
            id: body.id,
            approve_url,
        })
    }

    #[instrument(skip(self))]
    async fn capture_order(&self, gateway_order_id: &str) -> Result<CaptureOutcome, ServiceError> {
        let token = self.access_token().await?;

        let response = self
            .http
            .post(format!(
                "{}/v2/checkout/orders/{}/capture",
                self.config.api_base(),
                gateway_order_id
            ))
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(network_error)?;

        if !response.status().is_success() {
            return Err(error_from_response("capture", response).await);
        }

        let body: CaptureResponse = response
            .json()
            .await
            .map_err(|_| malformed("capture response"))?;

        Ok(CaptureOutcome {
            status: body.status,
        })
    }
}

fn network_error(err: reqwest::Error) -> ServiceError {
    ServiceError::GatewayError(format!("PayPal request failed: {}", err))
}

fn malformed(what: &str) -> ServiceError {
    ServiceError::GatewayError(format!("PayPal returned a malformed {}", what))
}

/// Maps a non-2xx gateway reply: prefer the error message in the JSON body,
/// fall back to the HTTP status.
async fn error_from_response(what: &str, response: reqwest::Response) -> ServiceError {
    let status = response.status();
    let message = match response.json::<ErrorBody>().await {
        Ok(ErrorBody { error: Some(msg) }) => msg,
        _ => format!("HTTP {}", status),
    };
    ServiceError::GatewayError(format!("PayPal {} failed: {}", what, message))
}
