//! Order domain events.

use chrono::{DateTime, Utc};
use common::{AggregateId, Money, UnitRef, UserId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::pricing::Pricing;

use super::{GatewayId, LineItem, OrderNumber, OrderStatus, PaymentStatus, ShippingAddress};

/// Events that can occur on an order aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Order was created with its stock already reserved.
    OrderPlaced(OrderPlacedData),

    StatusChanged(StatusChangedData),

    /// A payment attempt was started.
    PaymentInitiated(PaymentInitiatedData),

    PaymentCompleted(PaymentCompletedData),

    PaymentFailed(PaymentFailedData),

    /// An active attempt was abandoned (superseded or order cancelled).
    PaymentCancelled(PaymentCancelledData),

    PaymentRefunded(PaymentRefundedData),

    /// Reserved stock went back to the ledger after cancellation.
    StockRestored(StockRestoredData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "OrderPlaced",
            OrderEvent::StatusChanged(_) => "StatusChanged",
            OrderEvent::PaymentInitiated(_) => "PaymentInitiated",
            OrderEvent::PaymentCompleted(_) => "PaymentCompleted",
            OrderEvent::PaymentFailed(_) => "PaymentFailed",
            OrderEvent::PaymentCancelled(_) => "PaymentCancelled",
            OrderEvent::PaymentRefunded(_) => "PaymentRefunded",
            OrderEvent::StockRestored(_) => "StockRestored",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPlacedData {
    pub order_id: AggregateId,
    pub order_number: OrderNumber,
    pub user_id: UserId,
    pub items: Vec<LineItem>,
    pub pricing: Pricing,
    /// Payment method chosen at checkout.
    pub payment_method: GatewayId,
    pub shipping_address: Option<ShippingAddress>,
    pub actor: String,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChangedData {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub note: Option<String>,
    pub actor: String,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInitiatedData {
    pub attempt: u32,
    pub gateway: GatewayId,
    pub amount: Money,
    pub currency: String,
    /// `Initiated` for redirect gateways, `Pending` for manual ones.
    pub status: PaymentStatus,
    pub gateway_reference: Option<String>,
    pub gateway_response: serde_json::Value,
    pub initiated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCompletedData {
    pub attempt: u32,
    pub transaction_id: Option<String>,
    pub reference_id: Option<String>,
    pub gateway_response: serde_json::Value,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentFailedData {
    pub attempt: u32,
    pub reason: String,
    pub gateway_response: serde_json::Value,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCancelledData {
    pub attempt: u32,
    pub reason: String,
    pub cancelled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRefundedData {
    pub attempt: u32,
    pub reason: Option<String>,
    pub actor: String,
    pub refunded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoredUnit {
    pub unit: UnitRef,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockRestoredData {
    pub units: Vec<RestoredUnit>,
    pub restored_at: DateTime<Utc>,
}

// Event constructors
impl OrderEvent {
    pub fn status_changed(
        from: OrderStatus,
        to: OrderStatus,
        note: Option<String>,
        actor: impl Into<String>,
        changed_at: DateTime<Utc>,
    ) -> Self {
        OrderEvent::StatusChanged(StatusChangedData {
            from,
            to,
            note,
            actor: actor.into(),
            changed_at,
        })
    }

    pub fn payment_cancelled(
        attempt: u32,
        reason: impl Into<String>,
        cancelled_at: DateTime<Utc>,
    ) -> Self {
        OrderEvent::PaymentCancelled(PaymentCancelledData {
            attempt,
            reason: reason.into(),
            cancelled_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = OrderEvent::status_changed(
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            None,
            "system",
            Utc::now(),
        );
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "StatusChanged");
        assert_eq!(json["data"]["to"], "confirmed");
        assert_eq!(event.event_type(), "StatusChanged");
    }

    #[test]
    fn deserializes_payment_event() {
        let json = serde_json::json!({
            "type": "PaymentFailed",
            "data": {
                "attempt": 2,
                "reason": "user aborted",
                "gateway_response": {"status": "User canceled"},
                "failed_at": "2026-01-01T00:00:00Z"
            }
        });
        let event: OrderEvent = serde_json::from_value(json).unwrap();
        assert!(matches!(event, OrderEvent::PaymentFailed(data) if data.attempt == 2));
    }
}
