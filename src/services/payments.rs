use crate::{config::GatewayConfig, errors::ServiceError};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use tracing::{error, instrument};

type HmacSha256 = Hmac<Sha256>;

/// Order registered with the payment gateway before the customer pays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    /// Amount in minor units (paise)
    pub amount: i64,
    pub currency: String,
    pub status: String,
}

/// Payment as reported by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPayment {
    pub id: String,
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    #[serde(default)]
    pub method: Option<String>,
}

impl GatewayPayment {
    pub fn is_captured(&self) -> bool {
        self.status == "captured"
    }
}

/// Refund issued at the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRefund {
    pub id: String,
    pub payment_id: String,
    pub amount: i64,
    pub status: String,
}

/// Payment gateway operations the checkout workflow depends on.
/// Production uses [`RazorpayClient`]; tests substitute a fake.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Registers a gateway-side order. `notes` is opaque metadata the
    /// gateway stores with the order (cart id, customer id, address).
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
        notes: &serde_json::Value,
    ) -> Result<GatewayOrder, ServiceError>;

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, ServiceError>;

    async fn create_refund(
        &self,
        payment_id: &str,
        amount_minor: i64,
        reason: Option<&str>,
    ) -> Result<GatewayRefund, ServiceError>;
}

/// Razorpay REST client. All requests use HTTP basic auth with the
/// key id / key secret pair.
pub struct RazorpayClient {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl RazorpayClient {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
        }
    }

    fn gateway_error(context: &str, err: reqwest::Error) -> ServiceError {
        error!(error = %err, "Gateway request failed: {}", context);
        ServiceError::GatewayUnavailable(context.to_string())
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    #[instrument(skip(self, notes))]
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
        notes: &serde_json::Value,
    ) -> Result<GatewayOrder, ServiceError> {
        let response = self
            .client
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&json!({
                "amount": amount_minor,
                "currency": currency,
                "receipt": receipt,
                "notes": notes,
                "payment_capture": 1,
            }))
            .send()
            .await
            .map_err(|e| Self::gateway_error("create order", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, %body, "Gateway rejected order creation");
            return Err(ServiceError::GatewayUnavailable(
                "create order".to_string(),
            ));
        }

        response
            .json::<GatewayOrder>()
            .await
            .map_err(|e| Self::gateway_error("decode order", e))
    }

    #[instrument(skip(self))]
    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, ServiceError> {
        let response = self
            .client
            .get(format!("{}/payments/{}", self.base_url, payment_id))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await
            .map_err(|e| Self::gateway_error("fetch payment", e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(format!(
                "Payment {} not found at gateway",
                payment_id
            )));
        }
        if !response.status().is_success() {
            return Err(ServiceError::GatewayUnavailable(
                "fetch payment".to_string(),
            ));
        }

        response
            .json::<GatewayPayment>()
            .await
            .map_err(|e| Self::gateway_error("decode payment", e))
    }

    #[instrument(skip(self))]
    async fn create_refund(
        &self,
        payment_id: &str,
        amount_minor: i64,
        reason: Option<&str>,
    ) -> Result<GatewayRefund, ServiceError> {
        let mut body = json!({ "amount": amount_minor });
        if let Some(reason) = reason {
            body["notes"] = json!({ "reason": reason });
        }
        let response = self
            .client
            .post(format!("{}/payments/{}/refund", self.base_url, payment_id))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::gateway_error("create refund", e))?;

        if !response.status().is_success() {
            return Err(ServiceError::GatewayUnavailable(
                "create refund".to_string(),
            ));
        }

        response
            .json::<GatewayRefund>()
            .await
            .map_err(|e| Self::gateway_error("decode refund", e))
    }
}

/// Converts a major-unit amount (rupees) to gateway minor units (paise).
/// The conversion happens only at this boundary; everything else in the
/// system works in major-unit decimals.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * Decimal::from(100))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| {
            ServiceError::InvalidOperation(format!("Amount {} out of range", amount))
        })
}

pub fn from_minor_units(amount_minor: i64) -> Decimal {
    Decimal::new(amount_minor, 2)
}

fn hmac_hex(secret: &str, message: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies the client-reported payment signature: HMAC-SHA256 over
/// `"{gateway_order_id}|{gateway_payment_id}"` keyed by the gateway
/// secret, hex-encoded. Comparison is constant-time.
pub fn verify_payment_signature(
    secret: &str,
    gateway_order_id: &str,
    gateway_payment_id: &str,
    signature: &str,
) -> Result<(), ServiceError> {
    let message = format!("{}|{}", gateway_order_id, gateway_payment_id);
    verify_hmac(secret, message.as_bytes(), signature)
}

/// Verifies the `X-Razorpay-Signature` header on webhook deliveries:
/// HMAC-SHA256 over the raw request body keyed by the webhook secret.
pub fn verify_webhook_signature(
    secret: &str,
    body: &[u8],
    signature: &str,
) -> Result<(), ServiceError> {
    verify_hmac(secret, body, signature)
}

fn verify_hmac(secret: &str, message: &[u8], signature: &str) -> Result<(), ServiceError> {
    let expected = hex::decode(signature).map_err(|_| ServiceError::SignatureInvalid)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(message);
    mac.verify_slice(&expected)
        .map_err(|_| ServiceError::SignatureInvalid)
}

/// Signs a payment the way the gateway does. Test-harness counterpart
/// of [`verify_payment_signature`].
pub fn sign_payment(secret: &str, gateway_order_id: &str, gateway_payment_id: &str) -> String {
    hmac_hex(secret, &format!("{}|{}", gateway_order_id, gateway_payment_id))
}

/// Signs a webhook body the way the gateway does.
pub fn sign_webhook(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
