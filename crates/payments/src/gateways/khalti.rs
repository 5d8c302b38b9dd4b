//! Khalti ePayment v2: server-side initiate, server-side lookup.

use std::sync::Arc;

use async_trait::async_trait;
use common::Money;
use domain::GatewayId;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};

use super::ensure_success;
use crate::config::KhaltiConfig;
use crate::error::GatewayError;
use crate::gateway::{
    CallbackPayload, InitiateRequest, Initiation, PaymentGateway, PaymentMethodInfo,
    VerifiedOutcome, VerifiedPayment, parse_reference,
};

#[derive(Debug, Clone, Serialize)]
pub struct KhaltiCustomer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KhaltiInitiateRequest {
    pub return_url: String,
    pub website_url: String,
    /// In paisa.
    pub amount: i64,
    pub purchase_order_id: String,
    pub purchase_order_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_info: Option<KhaltiCustomer>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KhaltiInitiateResponse {
    pub pidx: String,
    pub payment_url: String,
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KhaltiLookup {
    pub pidx: String,
    /// In paisa.
    pub total_amount: i64,
    pub status: String,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub fee: Option<i64>,
    #[serde(default)]
    pub refunded: Option<bool>,
}

/// Khalti's merchant API.
#[async_trait]
pub trait KhaltiApi: Send + Sync {
    async fn initiate(
        &self,
        request: &KhaltiInitiateRequest,
    ) -> Result<KhaltiInitiateResponse, GatewayError>;

    async fn lookup(&self, pidx: &str) -> Result<KhaltiLookup, GatewayError>;
}

pub struct HttpKhaltiApi {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl HttpKhaltiApi {
    pub fn new(client: reqwest::Client, base_url: &str, secret_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }
}

#[async_trait]
impl KhaltiApi for HttpKhaltiApi {
    #[tracing::instrument(skip(self, request), fields(purchase_order_id = %request.purchase_order_id))]
    async fn initiate(
        &self,
        request: &KhaltiInitiateRequest,
    ) -> Result<KhaltiInitiateResponse, GatewayError> {
        let response = self
            .client
            .post(self.endpoint("epayment/initiate/"))
            .header(AUTHORIZATION, format!("Key {}", self.secret_key))
            .json(request)
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    #[tracing::instrument(skip(self))]
    async fn lookup(&self, pidx: &str) -> Result<KhaltiLookup, GatewayError> {
        let response = self
            .client
            .post(self.endpoint("epayment/lookup/"))
            .header(AUTHORIZATION, format!("Key {}", self.secret_key))
            .json(&serde_json::json!({ "pidx": pidx }))
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }
}

pub struct KhaltiGateway {
    config: KhaltiConfig,
    api: Arc<dyn KhaltiApi>,
}

impl KhaltiGateway {
    pub fn new(config: KhaltiConfig, api: Arc<dyn KhaltiApi>) -> Self {
        Self { config, api }
    }
}

#[async_trait]
impl PaymentGateway for KhaltiGateway {
    fn id(&self) -> GatewayId {
        GatewayId::Khalti
    }

    fn info(&self) -> PaymentMethodInfo {
        PaymentMethodInfo {
            id: GatewayId::Khalti,
            name: "Khalti".to_string(),
            description: "Pay with Khalti wallet, mobile banking or cards".to_string(),
            enabled: self.config.enabled,
        }
    }

    #[tracing::instrument(skip(self, request), fields(reference = %request.reference))]
    async fn initiate(&self, request: &InitiateRequest) -> Result<Initiation, GatewayError> {
        let mut website_url = request.callback_url.clone();
        website_url.set_path("/");
        website_url.set_query(None);

        let payer = &request.payer;
        let customer_info = (payer.name.is_some() || payer.email.is_some() || payer.phone.is_some())
            .then(|| KhaltiCustomer {
                name: payer.name.clone(),
                email: payer.email.clone(),
                phone: payer.phone.clone(),
            });

        let session = self
            .api
            .initiate(&KhaltiInitiateRequest {
                return_url: request.callback_url.to_string(),
                website_url: website_url.to_string(),
                amount: request.total.minor(),
                purchase_order_id: request.reference.to_string(),
                purchase_order_name: request.order_number.clone(),
                customer_info,
            })
            .await?;

        Ok(Initiation {
            gateway: GatewayId::Khalti,
            redirect_url: Some(session.payment_url.clone()),
            form_fields: None,
            manual: false,
            gateway_reference: Some(session.pidx.clone()),
            gateway_response: serde_json::to_value(&session).unwrap_or(serde_json::Value::Null),
        })
    }

    /// The callback's own `status` is ignored; the lookup decides.
    #[tracing::instrument(skip(self, payload))]
    async fn verify(&self, payload: &CallbackPayload) -> Result<VerifiedPayment, GatewayError> {
        let pidx = payload.require("pidx")?;
        let reference = parse_reference(payload.require("purchase_order_id")?)?;

        let lookup = self.api.lookup(pidx).await?;
        if lookup.pidx != pidx {
            return Err(GatewayError::verification("khalti lookup returned another session"));
        }
        let raw = serde_json::to_value(&lookup).unwrap_or(serde_json::Value::Null);

        let outcome = match lookup.status.as_str() {
            "Completed" => VerifiedOutcome::Captured {
                amount: Some(Money::from_minor(lookup.total_amount)),
                transaction_id: lookup.transaction_id.clone(),
                reference_id: None,
            },
            "Pending" | "Initiated" => {
                return Err(GatewayError::verification("khalti payment is not final yet"));
            }
            other => VerifiedOutcome::Failed {
                reason: format!("khalti reported {other}"),
            },
        };

        Ok(VerifiedPayment::new(
            reference,
            GatewayId::Khalti,
            Some(lookup.pidx),
            outcome,
            raw,
        ))
    }
}
