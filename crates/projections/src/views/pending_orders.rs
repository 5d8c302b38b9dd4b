//! Index of unpaid pending orders, used by the expiry sweep.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use domain::{Aggregate, GatewayId, Order, OrderEvent, OrderStatus, PaymentStatus};
use event_store::{EventEnvelope, Version};
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::Projection;
use crate::read_model::ReadModel;

#[derive(Debug, Clone, PartialEq)]
pub struct PendingOrder {
    pub order_id: AggregateId,
    pub user_id: UserId,
    pub placed_at: DateTime<Utc>,
    pub payment_method: GatewayId,
    /// Latest attempt per number.
    attempts: HashMap<u32, (GatewayId, PaymentStatus)>,
    version: Version,
}

impl PendingOrder {
    pub fn is_paid(&self) -> bool {
        self.attempts
            .values()
            .any(|(_, status)| *status == PaymentStatus::Completed)
    }

    /// Cash-on-delivery orders wait for the courier, not for a gateway.
    pub fn awaits_cash(&self) -> bool {
        self.payment_method == GatewayId::Cod
            || self
                .attempts
                .values()
                .any(|(gateway, status)| *gateway == GatewayId::Cod && status.is_active())
    }

    pub fn is_expirable(&self) -> bool {
        !self.is_paid() && !self.awaits_cash()
    }
}

#[derive(Default)]
struct PendingOrdersState {
    pending: HashMap<AggregateId, PendingOrder>,
    /// Orders that left `pending`, with the version at which they did.
    settled: HashMap<AggregateId, Version>,
}

/// Orders still in `pending`, with enough payment state to decide expiry.
#[derive(Clone, Default)]
pub struct PendingOrdersView {
    state: Arc<RwLock<PendingOrdersState>>,
}

impl PendingOrdersView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, order_id: AggregateId) -> Option<PendingOrder> {
        self.state.read().await.pending.get(&order_id).cloned()
    }

    pub async fn pending_count(&self) -> usize {
        self.state.read().await.pending.len()
    }

    /// Unpaid, non-COD pending orders placed before `cutoff`, oldest first.
    ///
    /// The caller re-checks each order against the aggregate before acting.
    pub async fn expirable_before(&self, cutoff: DateTime<Utc>) -> Vec<AggregateId> {
        let state = self.state.read().await;
        let mut stale: Vec<&PendingOrder> = state
            .pending
            .values()
            .filter(|p| p.placed_at < cutoff && p.is_expirable())
            .collect();
        stale.sort_by_key(|p| p.placed_at);
        stale.into_iter().map(|p| p.order_id).collect()
    }
}

#[async_trait]
impl Projection for PendingOrdersView {
    fn name(&self) -> &'static str {
        "PendingOrdersView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        if event.aggregate_type != Order::aggregate_type() {
            return Ok(());
        }

        let order_event: OrderEvent = serde_json::from_value(event.payload.clone())?;
        let order_id = event.aggregate_id;
        let mut state = self.state.write().await;

        if state.settled.contains_key(&order_id) {
            // Events after leaving pending cannot bring the order back.
            if state.settled.get(&order_id).is_some_and(|v| event.version > *v) {
                state.settled.insert(order_id, event.version);
            }
            return Ok(());
        }

        if let Some(existing) = state.pending.get(&order_id)
            && event.version <= existing.version
        {
            return Ok(());
        }

        match order_event {
            OrderEvent::OrderPlaced(data) => {
                state.pending.insert(
                    order_id,
                    PendingOrder {
                        order_id,
                        user_id: data.user_id,
                        placed_at: data.placed_at,
                        payment_method: data.payment_method,
                        attempts: HashMap::new(),
                        version: event.version,
                    },
                );
            }
            OrderEvent::StatusChanged(data) if data.to != OrderStatus::Pending => {
                state.pending.remove(&order_id);
                state.settled.insert(order_id, event.version);
            }
            other => {
                if let Some(pending) = state.pending.get_mut(&order_id) {
                    track_payment(pending, other);
                    pending.version = event.version;
                }
            }
        }

        Ok(())
    }
}

fn track_payment(pending: &mut PendingOrder, event: OrderEvent) {
    let (attempt, status) = match event {
        OrderEvent::PaymentInitiated(data) => {
            pending
                .attempts
                .insert(data.attempt, (data.gateway, data.status));
            return;
        }
        OrderEvent::PaymentCompleted(data) => (data.attempt, PaymentStatus::Completed),
        OrderEvent::PaymentFailed(data) => (data.attempt, PaymentStatus::Failed),
        OrderEvent::PaymentCancelled(data) => (data.attempt, PaymentStatus::Cancelled),
        OrderEvent::PaymentRefunded(data) => (data.attempt, PaymentStatus::Refunded),
        OrderEvent::OrderPlaced(_) | OrderEvent::StatusChanged(_) | OrderEvent::StockRestored(_) => {
            return;
        }
    };
    if let Some(entry) = pending.attempts.get_mut(&attempt) {
        entry.1 = status;
    }
}

impl ReadModel for PendingOrdersView {
    fn name(&self) -> &'static str {
        "PendingOrdersView"
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.pending.len()).unwrap_or(0)
    }
}
