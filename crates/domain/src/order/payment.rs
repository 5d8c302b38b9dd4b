//! Payment attempts recorded on an order.

use chrono::{DateTime, Utc};
use common::{AggregateId, Money};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payment provider identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayId {
    /// Cash on delivery.
    Cod,
    Esewa,
    Khalti,
}

impl GatewayId {
    pub const ALL: [GatewayId; 3] = [GatewayId::Cod, GatewayId::Esewa, GatewayId::Khalti];

    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayId::Cod => "cod",
            GatewayId::Esewa => "esewa",
            GatewayId::Khalti => "khalti",
        }
    }

    /// Manual gateways have no redirect and no callback.
    pub fn is_manual(&self) -> bool {
        matches!(self, GatewayId::Cod)
    }
}

impl std::fmt::Display for GatewayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GatewayId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GatewayId::ALL
            .into_iter()
            .find(|g| g.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown payment gateway: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Initiated,
    Pending,
    Completed,
    Failed,
    Refunded,
    Cancelled,
}

impl PaymentStatus {
    /// Initiated or pending: the attempt may still settle.
    pub fn is_active(&self) -> bool {
        matches!(self, PaymentStatus::Initiated | PaymentStatus::Pending)
    }

    /// Money was captured (and possibly given back).
    pub fn is_settled(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Refunded)
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        match (self, next) {
            (Initiated | Pending, Completed | Failed | Cancelled) => true,
            // A verified late success on an attempt we had given up on.
            (Failed | Cancelled, Completed) => true,
            (Completed, Refunded) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Initiated => "initiated",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One try at paying for an order through a gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAttempt {
    /// 1-based sequence number within the order.
    pub attempt: u32,
    pub gateway: GatewayId,
    pub amount: Money,
    pub currency: String,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub reference_id: Option<String>,
    /// Provider session id (Khalti `pidx`).
    pub gateway_reference: Option<String>,
    /// Provider payloads, kept for audit only.
    pub gateway_response: serde_json::Value,
    pub initiated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Payment view exposed on an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSummary {
    pub method: GatewayId,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub reference_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Identifier sent to gateways for an attempt: `<order uuid hex>-<attempt>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PaymentReference {
    pub order_id: AggregateId,
    pub attempt: u32,
}

impl PaymentReference {
    pub fn new(order_id: AggregateId, attempt: u32) -> Self {
        Self { order_id, attempt }
    }
}

impl std::fmt::Display for PaymentReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.order_id.as_uuid().simple(), self.attempt)
    }
}

impl std::str::FromStr for PaymentReference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("invalid payment reference: {s}");
        let (order, attempt) = s.rsplit_once('-').ok_or_else(invalid)?;
        let order_id = Uuid::try_parse(order).map_err(|_| invalid())?;
        let attempt = attempt.parse::<u32>().map_err(|_| invalid())?;
        if attempt == 0 {
            return Err(invalid());
        }
        Ok(Self::new(AggregateId::from_uuid(order_id), attempt))
    }
}
