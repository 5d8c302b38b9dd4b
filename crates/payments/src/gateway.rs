//! The seam every payment provider plugs into.

use std::collections::BTreeMap;

use async_trait::async_trait;
use common::Money;
use domain::{GatewayId, PaymentReference};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::GatewayError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentMethodInfo {
    pub id: GatewayId,
    pub name: String,
    pub description: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PayerInfo {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Everything a provider needs to open a payment session.
#[derive(Debug, Clone)]
pub struct InitiateRequest {
    pub reference: PaymentReference,
    pub order_number: String,
    /// Amount due, in minor units of `currency`.
    pub total: Money,
    pub tax: Money,
    pub shipping: Money,
    pub currency: String,
    /// Where the provider sends the customer back.
    pub callback_url: Url,
    pub payer: PayerInfo,
}

impl InitiateRequest {
    /// Goods amount: the total without tax and delivery.
    pub fn product_amount(&self) -> Money {
        self.total - self.tax - self.shipping
    }
}

/// What the customer's browser does next.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Initiation {
    pub gateway: GatewayId,
    /// Page to redirect to, or the form action for form-post gateways.
    pub redirect_url: Option<String>,
    /// Signed fields to post to `redirect_url`.
    pub form_fields: Option<BTreeMap<String, String>>,
    /// No redirect: the payment is settled out of band.
    pub manual: bool,
    /// Provider session id.
    pub gateway_reference: Option<String>,
    #[serde(skip)]
    pub gateway_response: serde_json::Value,
}

impl Initiation {
    pub fn manual(gateway: GatewayId) -> Self {
        Self {
            gateway,
            redirect_url: None,
            form_fields: None,
            manual: true,
            gateway_reference: None,
            gateway_response: serde_json::Value::Null,
        }
    }
}

/// Raw parameters a provider sent back, from a redirect query or a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct CallbackPayload {
    params: BTreeMap<String, String>,
}

impl CallbackPayload {
    pub fn new(params: BTreeMap<String, String>) -> Self {
        Self { params }
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            params: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn require(&self, key: &str) -> Result<&str, GatewayError> {
        self.get(key)
            .ok_or_else(|| GatewayError::verification(format!("missing `{key}` in callback")))
    }

    /// Audit copy of what was received.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.params).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifiedOutcome {
    Captured {
        /// Amount the provider reports, when it reports one.
        amount: Option<Money>,
        transaction_id: Option<String>,
        reference_id: Option<String>,
    },
    Failed {
        reason: String,
    },
}

/// A provider's answer, after its authenticity was checked.
///
/// Only gateway verifiers in this crate can build one, so reconciliation
/// never runs on unverified input.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedPayment {
    reference: PaymentReference,
    gateway: GatewayId,
    gateway_reference: Option<String>,
    outcome: VerifiedOutcome,
    raw: serde_json::Value,
}

impl VerifiedPayment {
    pub(crate) fn new(
        reference: PaymentReference,
        gateway: GatewayId,
        gateway_reference: Option<String>,
        outcome: VerifiedOutcome,
        raw: serde_json::Value,
    ) -> Self {
        Self {
            reference,
            gateway,
            gateway_reference,
            outcome,
            raw,
        }
    }

    pub fn reference(&self) -> PaymentReference {
        self.reference
    }

    pub fn gateway(&self) -> GatewayId {
        self.gateway
    }

    pub fn gateway_reference(&self) -> Option<&str> {
        self.gateway_reference.as_deref()
    }

    pub fn outcome(&self) -> &VerifiedOutcome {
        &self.outcome
    }

    pub fn is_captured(&self) -> bool {
        matches!(self.outcome, VerifiedOutcome::Captured { .. })
    }

    pub fn raw(&self) -> &serde_json::Value {
        &self.raw
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn id(&self) -> GatewayId;

    fn info(&self) -> PaymentMethodInfo;

    /// Opens a payment session for one attempt.
    async fn initiate(&self, request: &InitiateRequest) -> Result<Initiation, GatewayError>;

    /// Establishes what really happened, from the provider's own signed data
    /// or status API. Callback query values are never trusted on their own.
    async fn verify(&self, payload: &CallbackPayload) -> Result<VerifiedPayment, GatewayError>;
}

pub(crate) fn parse_reference(value: &str) -> Result<PaymentReference, GatewayError> {
    value.parse().map_err(GatewayError::VerificationFailed)
}
