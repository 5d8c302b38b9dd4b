//! eSewa ePay v2: signed form post out, signed base64 JSON back.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use common::Money;
use domain::GatewayId;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;

use super::ensure_success;
use crate::config::EsewaConfig;
use crate::error::GatewayError;
use crate::gateway::{
    CallbackPayload, InitiateRequest, Initiation, PaymentGateway, PaymentMethodInfo,
    VerifiedOutcome, VerifiedPayment, parse_reference,
};

type HmacSha256 = Hmac<Sha256>;

/// Fields eSewa signs at initiation, in order.
const SIGNED_FIELDS: &str = "total_amount,transaction_uuid,product_code";

/// Fields a callback must have signed before any of them is believed.
const REQUIRED_SIGNED: [&str; 4] = ["status", "total_amount", "transaction_uuid", "product_code"];

#[derive(Debug, Clone, Serialize)]
pub struct EsewaStatusQuery {
    pub product_code: String,
    pub total_amount: String,
    pub transaction_uuid: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EsewaStatus {
    #[serde(default)]
    pub product_code: Option<String>,
    #[serde(default)]
    pub transaction_uuid: Option<String>,
    #[serde(default)]
    pub total_amount: Option<Value>,
    pub status: String,
    #[serde(default)]
    pub ref_id: Option<String>,
}

/// eSewa's transaction status endpoint.
#[async_trait]
pub trait EsewaStatusApi: Send + Sync {
    async fn status(&self, query: &EsewaStatusQuery) -> Result<EsewaStatus, GatewayError>;
}

pub struct HttpEsewaStatusApi {
    client: reqwest::Client,
    status_url: String,
}

impl HttpEsewaStatusApi {
    pub fn new(client: reqwest::Client, status_url: impl Into<String>) -> Self {
        Self {
            client,
            status_url: status_url.into(),
        }
    }
}

#[async_trait]
impl EsewaStatusApi for HttpEsewaStatusApi {
    #[tracing::instrument(skip(self), fields(transaction_uuid = %query.transaction_uuid))]
    async fn status(&self, query: &EsewaStatusQuery) -> Result<EsewaStatus, GatewayError> {
        let response = self
            .client
            .get(&self.status_url)
            .query(query)
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }
}

pub struct EsewaGateway {
    config: EsewaConfig,
    status_api: Arc<dyn EsewaStatusApi>,
}

impl EsewaGateway {
    pub fn new(config: EsewaConfig, status_api: Arc<dyn EsewaStatusApi>) -> Self {
        Self { config, status_api }
    }

    fn mac(&self) -> Result<HmacSha256, GatewayError> {
        if self.config.secret_key.trim().is_empty() {
            return Err(GatewayError::Config("esewa secret key is not set".to_string()));
        }
        HmacSha256::new_from_slice(self.config.secret_key.as_bytes())
            .map_err(|e| GatewayError::Config(format!("esewa secret key: {e}")))
    }

    /// Base64 HMAC-SHA256 of `message` under the merchant secret.
    pub fn sign(&self, message: &str) -> Result<String, GatewayError> {
        let mut mac = self.mac()?;
        mac.update(message.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    fn check_signature(&self, message: &str, signature: &str) -> Result<(), GatewayError> {
        let signature = STANDARD
            .decode(signature.trim())
            .map_err(|_| GatewayError::verification("esewa signature is not base64"))?;
        let mut mac = self.mac()?;
        mac.update(message.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| GatewayError::verification("esewa signature mismatch"))
    }

    /// Success redirects carry `data`: base64 JSON signed over its own
    /// `signed_field_names`.
    fn verify_signed(&self, data: &str) -> Result<VerifiedPayment, GatewayError> {
        // Query decoding turns an unescaped `+` into a space.
        let decoded = STANDARD
            .decode(data.trim().replace(' ', "+"))
            .map_err(|_| GatewayError::verification("esewa callback data is not base64"))?;
        let fields: serde_json::Map<String, Value> = serde_json::from_slice(&decoded)
            .map_err(|_| GatewayError::verification("esewa callback data is not a JSON object"))?;
        let text = |key: &str| fields.get(key).map(field_text);

        let signed_names = text("signed_field_names")
            .ok_or_else(|| GatewayError::verification("esewa callback has no signed_field_names"))?;
        let signature = text("signature")
            .ok_or_else(|| GatewayError::verification("esewa callback has no signature"))?;

        let names: Vec<&str> = signed_names.split(',').map(str::trim).collect();
        if let Some(missing) = REQUIRED_SIGNED.iter().find(|f| !names.contains(*f)) {
            return Err(GatewayError::verification(format!(
                "esewa callback did not sign `{missing}`"
            )));
        }
        let message = names
            .iter()
            .map(|name| format!("{name}={}", text(name).unwrap_or_default()))
            .collect::<Vec<_>>()
            .join(",");
        self.check_signature(&message, &signature)?;

        self.ensure_product_code(text("product_code").as_deref())?;
        let uuid = text("transaction_uuid").unwrap_or_default();
        let reference = parse_reference(&uuid)?;
        let status = text("status").unwrap_or_default();
        let raw = Value::Object(fields.clone());

        let outcome = match status.as_str() {
            "COMPLETE" => VerifiedOutcome::Captured {
                amount: reported_amount(text("total_amount").as_deref())?,
                transaction_id: text("transaction_code"),
                reference_id: text("ref_id"),
            },
            "PENDING" | "AMBIGUOUS" => {
                return Err(GatewayError::verification("esewa payment is not final yet"));
            }
            other => VerifiedOutcome::Failed {
                reason: format!("esewa reported {other}"),
            },
        };

        Ok(VerifiedPayment::new(reference, GatewayId::Esewa, None, outcome, raw))
    }

    /// Failure redirects carry nothing signed, so only the status API's
    /// answer counts.
    async fn verify_by_status(
        &self,
        payload: &CallbackPayload,
    ) -> Result<VerifiedPayment, GatewayError> {
        let uuid = payload.require("transaction_uuid")?;
        let total_amount = payload.require("total_amount")?;
        let reference = parse_reference(uuid)?;

        let status = self
            .status_api
            .status(&EsewaStatusQuery {
                product_code: self.config.product_code.clone(),
                total_amount: total_amount.to_string(),
                transaction_uuid: uuid.to_string(),
            })
            .await?;

        if status.transaction_uuid.as_deref().is_some_and(|u| u != uuid) {
            return Err(GatewayError::verification("esewa status is for another transaction"));
        }
        if status.product_code.is_some() {
            self.ensure_product_code(status.product_code.as_deref())?;
        }
        let raw = serde_json::to_value(&status).unwrap_or(Value::Null);

        // The queried amount is browser-supplied; NOT_FOUND may only mean it was altered.
        let outcome = match status.status.as_str() {
            "COMPLETE" => VerifiedOutcome::Captured {
                amount: reported_amount(status.total_amount.as_ref().map(field_text).as_deref())?,
                transaction_id: None,
                reference_id: status.ref_id.clone(),
            },
            failed @ ("CANCELED" | "FULL_REFUND" | "PARTIAL_REFUND") => VerifiedOutcome::Failed {
                reason: format!("esewa reported {failed}"),
            },
            "PENDING" | "AMBIGUOUS" => {
                return Err(GatewayError::verification("esewa payment is not final yet"));
            }
            other => {
                return Err(GatewayError::verification(format!(
                    "esewa status {other} does not settle the payment"
                )));
            }
        };

        Ok(VerifiedPayment::new(reference, GatewayId::Esewa, None, outcome, raw))
    }

    fn ensure_product_code(&self, code: Option<&str>) -> Result<(), GatewayError> {
        if code == Some(self.config.product_code.as_str()) {
            Ok(())
        } else {
            Err(GatewayError::verification("esewa product code mismatch"))
        }
    }
}

#[async_trait]
impl PaymentGateway for EsewaGateway {
    fn id(&self) -> GatewayId {
        GatewayId::Esewa
    }

    fn info(&self) -> PaymentMethodInfo {
        PaymentMethodInfo {
            id: GatewayId::Esewa,
            name: "eSewa".to_string(),
            description: "Pay with your eSewa wallet".to_string(),
            enabled: self.config.enabled,
        }
    }

    #[tracing::instrument(skip(self, request), fields(reference = %request.reference))]
    async fn initiate(&self, request: &InitiateRequest) -> Result<Initiation, GatewayError> {
        let reference = request.reference.to_string();
        let total_amount = request.total.to_decimal_string();
        let signature = self.sign(&format!(
            "total_amount={total_amount},transaction_uuid={reference},product_code={}",
            self.config.product_code
        ))?;

        let mut failure_url = request.callback_url.clone();
        failure_url
            .query_pairs_mut()
            .append_pair("transaction_uuid", &reference)
            .append_pair("total_amount", &total_amount);

        let fields: BTreeMap<String, String> = [
            ("amount", request.product_amount().to_decimal_string()),
            ("tax_amount", request.tax.to_decimal_string()),
            ("product_service_charge", Money::zero().to_decimal_string()),
            ("product_delivery_charge", request.shipping.to_decimal_string()),
            ("total_amount", total_amount),
            ("transaction_uuid", reference),
            ("product_code", self.config.product_code.clone()),
            ("success_url", request.callback_url.to_string()),
            ("failure_url", failure_url.to_string()),
            ("signed_field_names", SIGNED_FIELDS.to_string()),
            ("signature", signature),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Ok(Initiation {
            gateway: GatewayId::Esewa,
            redirect_url: Some(self.config.form_url.clone()),
            gateway_response: serde_json::to_value(&fields).unwrap_or(Value::Null),
            form_fields: Some(fields),
            manual: false,
            gateway_reference: None,
        })
    }

    #[tracing::instrument(skip(self, payload))]
    async fn verify(&self, payload: &CallbackPayload) -> Result<VerifiedPayment, GatewayError> {
        match payload.get("data") {
            Some(data) => self.verify_signed(data),
            None => self.verify_by_status(payload).await,
        }
    }
}

fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn reported_amount(text: Option<&str>) -> Result<Option<Money>, GatewayError> {
    match text {
        None => Ok(None),
        Some(t) => parse_amount(t)
            .map(Some)
            .ok_or_else(|| GatewayError::verification(format!("unreadable esewa amount {t}"))),
    }
}

/// Parses eSewa amounts such as `1000.0`, `1,000.50` or `100` into minor units.
fn parse_amount(text: &str) -> Option<Money> {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    let (major, minor) = cleaned.split_once('.').unwrap_or((cleaned.as_str(), ""));
    if major.is_empty() || !major.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if !minor.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let major: i64 = major.parse().ok()?;
    let minor: i64 = format!("{minor:0<2}")[..2].parse().ok()?;
    Some(Money::from_minor(major.checked_mul(100)?.checked_add(minor)?))
}
