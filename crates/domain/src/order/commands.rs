//! Order commands.

use common::{AggregateId, Money, UserId};

use crate::command::Command;
use crate::pricing::Pricing;

use super::{
    GatewayId, LineItem, Order, OrderStatus, PaymentStatus, RestoredUnit, ShippingAddress,
};

/// Actor name recorded for transitions the system makes on its own.
pub const SYSTEM_ACTOR: &str = "system";

macro_rules! order_command {
    ($name:ident) => {
        impl Command for $name {
            type Aggregate = Order;

            fn aggregate_id(&self) -> AggregateId {
                self.order_id
            }
        }
    };
}

/// Create an order from already-reserved, already-priced lines.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub order_id: AggregateId,
    pub user_id: UserId,
    pub items: Vec<LineItem>,
    pub pricing: Pricing,
    pub payment_method: GatewayId,
    pub shipping_address: Option<ShippingAddress>,
    pub actor: String,
}

order_command!(PlaceOrder);

/// Move an order to another status.
#[derive(Debug, Clone)]
pub struct ChangeStatus {
    pub order_id: AggregateId,
    pub requested: OrderStatus,
    pub note: Option<String>,
    pub actor: String,
    /// Extra restriction on the current status, checked with the table.
    pub only_from: Option<&'static [OrderStatus]>,
}

impl ChangeStatus {
    pub fn new(order_id: AggregateId, requested: OrderStatus, actor: impl Into<String>) -> Self {
        Self {
            order_id,
            requested,
            note: None,
            actor: actor.into(),
            only_from: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_optional_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }

    pub fn only_from(mut self, statuses: &'static [OrderStatus]) -> Self {
        self.only_from = Some(statuses);
        self
    }
}

order_command!(ChangeStatus);

/// Record a new payment attempt for the order's full total.
#[derive(Debug, Clone)]
pub struct StartPayment {
    pub order_id: AggregateId,
    /// Attempt number the gateway was told about; must be the next one.
    pub attempt: u32,
    pub gateway: GatewayId,
    pub currency: String,
    pub status: PaymentStatus,
    pub gateway_reference: Option<String>,
    pub gateway_response: serde_json::Value,
    pub actor: String,
}

order_command!(StartPayment);

/// A gateway confirmed that money was captured for an attempt.
#[derive(Debug, Clone)]
pub struct RecordPaymentSuccess {
    pub order_id: AggregateId,
    pub attempt: u32,
    pub gateway: GatewayId,
    /// Amount the provider reports, when it reports one.
    pub amount: Option<Money>,
    pub gateway_reference: Option<String>,
    pub transaction_id: Option<String>,
    pub reference_id: Option<String>,
    pub gateway_response: serde_json::Value,
    pub actor: String,
}

order_command!(RecordPaymentSuccess);

/// A gateway reported that an attempt did not capture money.
#[derive(Debug, Clone)]
pub struct RecordPaymentFailure {
    pub order_id: AggregateId,
    pub attempt: u32,
    pub gateway: GatewayId,
    pub reason: String,
    pub gateway_response: serde_json::Value,
    pub actor: String,
}

order_command!(RecordPaymentFailure);

/// Cash on delivery was collected by the courier.
#[derive(Debug, Clone)]
pub struct CollectCashPayment {
    pub order_id: AggregateId,
    pub currency: String,
    pub actor: String,
}

order_command!(CollectCashPayment);

#[derive(Debug, Clone)]
pub struct RefundPayment {
    pub order_id: AggregateId,
    pub reason: Option<String>,
    pub actor: String,
}

order_command!(RefundPayment);

/// The ledger took back the order's reserved stock.
#[derive(Debug, Clone)]
pub struct MarkStockRestored {
    pub order_id: AggregateId,
    pub units: Vec<RestoredUnit>,
    pub actor: String,
}

order_command!(MarkStockRestored);
