//! Per-user order list.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AggregateId, Money, UserId};
use domain::{Aggregate, Order, OrderEvent, OrderStatus, PaymentSummary};
use event_store::EventEnvelope;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::Projection;
use crate::read_model::ReadModel;

/// One row of an order list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderSummary {
    pub order_id: AggregateId,
    pub order_number: String,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub total: Money,
    pub item_count: u32,
    pub payment: Option<PaymentSummary>,
    pub can_be_cancelled: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl OrderSummary {
    fn from_order(order_id: AggregateId, order: &Order, updated_at: DateTime<Utc>) -> Option<Self> {
        let user_id = order.user_id()?;
        Some(Self {
            order_id,
            order_number: order
                .order_number()
                .map(|n| n.as_str().to_string())
                .unwrap_or_default(),
            user_id,
            status: order.status(),
            total: order.pricing().map(|p| p.total()).unwrap_or_default(),
            item_count: order.items().iter().map(|i| i.quantity).sum(),
            payment: order.payment(),
            can_be_cancelled: order.can_be_cancelled(),
            created_at: order.created_at(),
            updated_at,
        })
    }
}

#[derive(Default)]
struct UserOrdersState {
    orders: HashMap<AggregateId, (Order, DateTime<Utc>)>,
    by_user: HashMap<UserId, Vec<AggregateId>>,
}

impl UserOrdersState {
    fn summary(&self, order_id: &AggregateId) -> Option<OrderSummary> {
        let (order, updated_at) = self.orders.get(order_id)?;
        OrderSummary::from_order(*order_id, order, *updated_at)
    }
}

/// Orders grouped by owner, newest first.
///
/// Each order is folded from its own events, so summaries carry the same
/// derived fields as the aggregate.
#[derive(Clone, Default)]
pub struct UserOrdersView {
    state: Arc<RwLock<UserOrdersState>>,
}

impl UserOrdersView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, order_id: AggregateId) -> Option<OrderSummary> {
        self.state.read().await.summary(&order_id)
    }

    pub async fn orders_for(&self, user_id: UserId) -> Vec<OrderSummary> {
        let state = self.state.read().await;
        let mut orders: Vec<OrderSummary> = state
            .by_user
            .get(&user_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.summary(id))
            .collect();
        sort_newest_first(&mut orders);
        orders
    }

    pub async fn all_orders(&self) -> Vec<OrderSummary> {
        let state = self.state.read().await;
        let mut orders: Vec<OrderSummary> =
            state.orders.keys().filter_map(|id| state.summary(id)).collect();
        sort_newest_first(&mut orders);
        orders
    }
}

fn sort_newest_first(orders: &mut [OrderSummary]) {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

#[async_trait]
impl Projection for UserOrdersView {
    fn name(&self) -> &'static str {
        "UserOrdersView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        if event.aggregate_type != Order::aggregate_type() {
            return Ok(());
        }

        let order_event: OrderEvent = serde_json::from_value(event.payload.clone())?;
        let order_id = event.aggregate_id;
        let mut state = self.state.write().await;

        let (order, updated_at) = state
            .orders
            .entry(order_id)
            .or_insert_with(|| (Order::default(), event.timestamp));
        if event.version <= order.version() {
            return Ok(());
        }

        let placed_by = match &order_event {
            OrderEvent::OrderPlaced(data) => Some(data.user_id),
            _ => None,
        };
        order.apply(order_event);
        order.set_version(event.version);
        *updated_at = event.timestamp;

        if let Some(user_id) = placed_by {
            state.by_user.entry(user_id).or_default().push(order_id);
        }
        Ok(())
    }
}

impl ReadModel for UserOrdersView {
    fn name(&self) -> &'static str {
        "UserOrdersView"
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.orders.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::test_support::{envelope, placed, status_changed};

    #[tokio::test]
    async fn orders_are_listed_per_user() {
        let view = UserOrdersView::new();
        let alice = UserId::new();
        let bob = UserId::new();

        let a1 = AggregateId::new();
        let a2 = AggregateId::new();
        let b1 = AggregateId::new();
        view.handle(&envelope(a1, 1, &placed(a1, alice))).await.unwrap();
        view.handle(&envelope(b1, 1, &placed(b1, bob))).await.unwrap();
        view.handle(&envelope(a2, 1, &placed(a2, alice))).await.unwrap();

        let mine = view.orders_for(alice).await;
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|o| o.user_id == alice));
        assert_eq!(view.all_orders().await.len(), 3);
        assert_eq!(ReadModel::count(&view), 3);
    }

    #[tokio::test]
    async fn status_changes_update_the_summary() {
        let view = UserOrdersView::new();
        let user = UserId::new();
        let id = AggregateId::new();

        view.handle(&envelope(id, 1, &placed(id, user))).await.unwrap();
        let summary = view.get(id).await.unwrap();
        assert_eq!(summary.status, OrderStatus::Pending);
        assert!(summary.can_be_cancelled);
        assert_eq!(summary.item_count, 2);
        assert!(summary.order_number.starts_with("ORD-"));

        let shipped = [
            (OrderStatus::Pending, OrderStatus::Confirmed),
            (OrderStatus::Confirmed, OrderStatus::Processing),
            (OrderStatus::Processing, OrderStatus::Shipped),
        ];
        for (i, (from, to)) in shipped.into_iter().enumerate() {
            let version = i as i64 + 2;
            view.handle(&envelope(id, version, &status_changed(from, to)))
                .await
                .unwrap();
        }

        let summary = view.get(id).await.unwrap();
        assert_eq!(summary.status, OrderStatus::Shipped);
        assert!(!summary.can_be_cancelled);
    }

    #[tokio::test]
    async fn replayed_events_are_applied_once() {
        let view = UserOrdersView::new();
        let user = UserId::new();
        let id = AggregateId::new();
        let first = envelope(id, 1, &placed(id, user));

        view.handle(&first).await.unwrap();
        view.handle(&first).await.unwrap();

        assert_eq!(view.orders_for(user).await.len(), 1);
        assert_eq!(ReadModel::count(&view), 1);
    }

    #[tokio::test]
    async fn other_aggregate_types_are_ignored() {
        let view = UserOrdersView::new();
        let mut event = envelope(AggregateId::new(), 1, &placed(AggregateId::new(), UserId::new()));
        event.aggregate_type = "Cart".to_string();

        view.handle(&event).await.unwrap();

        assert!(view.all_orders().await.is_empty());
    }
}
