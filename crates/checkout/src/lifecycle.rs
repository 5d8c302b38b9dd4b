//! Order creation and status transitions with their inventory side effects.

use std::sync::Arc;

use catalog::{CartStore, Catalog, InventoryLedger, InventoryLedgerExt, ReservationItem};
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{
    Aggregate, ChangeStatus, GatewayId, MarkStockRestored, Order, OrderEvent, OrderService,
    OrderStatus, PlaceOrder, PricingPolicy, RestoredUnit, SYSTEM_ACTOR, ShippingAddress,
};
use event_store::EventStore;
use projections::{
    OrderSummary, PendingOrdersView, ProjectionProcessor, ReadModel, UserOrdersView,
};
use serde::Deserialize;

use crate::actor::Actor;
use crate::config::CheckoutConfig;
use crate::error::{CheckoutError, Result};
use crate::notifier::{self, LogNotifier, Notifier, StatusNotification};
use crate::snapshot::snapshot;

const EXPIRABLE_FROM: &[OrderStatus] = &[OrderStatus::Pending];
const EXPIRY_NOTE: &str = "payment not received in time";

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub payment_method: GatewayId,
    #[serde(default)]
    pub shipping_address: Option<ShippingAddress>,
}

/// Drives orders from cart to a terminal status.
///
/// Stock is reserved before an order exists and given back exactly once
/// when an order is cancelled, by the caller whose cancellation was
/// appended.
pub struct OrderLifecycle<S: EventStore + Clone + 'static> {
    orders: OrderService<S>,
    catalog: Arc<dyn Catalog>,
    carts: Arc<dyn CartStore>,
    ledger: Arc<dyn InventoryLedger>,
    notifier: Arc<dyn Notifier>,
    pricing: PricingPolicy,
    config: CheckoutConfig,
    processor: Arc<ProjectionProcessor<S>>,
    user_orders: UserOrdersView,
    pending_orders: PendingOrdersView,
}

impl<S: EventStore + Clone + 'static> OrderLifecycle<S> {
    pub fn new(
        store: S,
        catalog: Arc<dyn Catalog>,
        carts: Arc<dyn CartStore>,
        ledger: Arc<dyn InventoryLedger>,
    ) -> Self {
        let config = CheckoutConfig::default();
        let user_orders = UserOrdersView::new();
        let pending_orders = PendingOrdersView::new();
        let processor = view_processor(&store, &config, &user_orders, &pending_orders);

        Self {
            orders: OrderService::new(store).with_max_conflict_retries(config.max_conflict_retries),
            catalog,
            carts,
            ledger,
            notifier: Arc::new(LogNotifier),
            pricing: PricingPolicy::default(),
            config,
            processor,
            user_orders,
            pending_orders,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_pricing(mut self, pricing: PricingPolicy) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_config(mut self, config: CheckoutConfig) -> Self {
        let store = self.orders.store().clone();
        self.processor = view_processor(&store, &config, &self.user_orders, &self.pending_orders);
        self.orders = OrderService::new(store).with_max_conflict_retries(config.max_conflict_retries);
        self.config = config;
        self
    }

    pub fn orders(&self) -> &OrderService<S> {
        &self.orders
    }

    pub fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<dyn InventoryLedger> {
        &self.ledger
    }

    pub fn carts(&self) -> &Arc<dyn CartStore> {
        &self.carts
    }

    pub fn read_models(&self) -> [&dyn ReadModel; 2] {
        [&self.user_orders, &self.pending_orders]
    }

    /// Brings the read models up to date with the store.
    pub async fn refresh_views(&self) -> Result<()> {
        self.processor.run_catch_up().await?;
        Ok(())
    }

    /// Turns the caller's cart into a `pending` order.
    ///
    /// The cart is snapshotted and its stock reserved before anything is
    /// persisted. If the order cannot be appended the reservation is given
    /// back.
    #[tracing::instrument(skip(self, actor, request), fields(user_id = %actor.user_id, method = %request.payment_method))]
    pub async fn create_order(&self, actor: &Actor, request: CreateOrderRequest) -> Result<Order> {
        match self.try_create_order(actor, request).await {
            Ok(order) => {
                metrics::counter!("orders_created_total").increment(1);
                tracing::info!(
                    order_id = ?order.id(),
                    order_number = ?order.order_number().map(|n| n.as_str()),
                    total = ?order.pricing().map(|p| p.total()),
                    "order created"
                );
                Ok(order)
            }
            Err(e) => {
                metrics::counter!("orders_rejected_total", "reason" => e.reason()).increment(1);
                tracing::info!(error = %e, "order rejected");
                Err(e)
            }
        }
    }

    async fn try_create_order(&self, actor: &Actor, request: CreateOrderRequest) -> Result<Order> {
        if !self.config.accepts(request.payment_method) {
            return Err(CheckoutError::PaymentMethodUnavailable(request.payment_method));
        }

        let cart = self.carts.get(actor.user_id).await?;
        let items = snapshot(self.catalog.as_ref(), &cart).await?;
        let reservation: Vec<ReservationItem> = items
            .iter()
            .map(|item| ReservationItem::new(item.unit(), item.quantity))
            .collect();

        self.ledger.reserve(&reservation).await?;

        let order_id = AggregateId::new();
        let cmd = PlaceOrder {
            order_id,
            user_id: actor.user_id,
            pricing: self.pricing.price(&items),
            items,
            payment_method: request.payment_method,
            shipping_address: request.shipping_address,
            actor: actor.actor_name(),
        };

        let placed = match self.orders.place_order(cmd).await {
            Ok(placed) => placed,
            Err(e) => {
                tracing::warn!(%order_id, error = %e, "order not persisted, releasing reservation");
                if let Err(restore_err) = self.ledger.restore(&reservation).await {
                    tracing::error!(
                        %order_id,
                        error = %restore_err,
                        "releasing reservation failed, manual reconciliation required"
                    );
                }
                return Err(e.into());
            }
        };

        if let Err(e) = self.carts.clear(actor.user_id).await {
            tracing::warn!(%order_id, error = %e, "cart not cleared after checkout");
        }

        Ok(placed.aggregate)
    }

    /// Admin status change.
    #[tracing::instrument(skip(self, actor, note), fields(admin = %actor.user_id))]
    pub async fn update_status(
        &self,
        actor: &Actor,
        order_id: AggregateId,
        requested: OrderStatus,
        note: Option<String>,
    ) -> Result<Order> {
        if !actor.is_admin() {
            return Err(CheckoutError::Unauthorized(
                "only admins can change order status".to_string(),
            ));
        }
        self.transition(order_id, requested, &actor.actor_name(), note, None)
            .await
    }

    /// Customer cancellation, allowed while the order is pending or confirmed.
    #[tracing::instrument(skip(self, actor, reason), fields(user_id = %actor.user_id))]
    pub async fn cancel_order(
        &self,
        actor: &Actor,
        order_id: AggregateId,
        reason: Option<String>,
    ) -> Result<Order> {
        let order = self.load(order_id).await?;
        if !order.is_owned_by(actor.user_id) {
            return Err(CheckoutError::Unauthorized(
                "only the order owner can cancel it".to_string(),
            ));
        }
        self.transition(
            order_id,
            OrderStatus::Cancelled,
            &actor.actor_name(),
            reason,
            Some(OrderStatus::CUSTOMER_CANCELLABLE),
        )
        .await
    }

    /// Owner or admin. Other callers see the order as missing.
    pub async fn get_order(&self, actor: &Actor, order_id: AggregateId) -> Result<Order> {
        let order = self.load(order_id).await?;
        if actor.is_admin() || order.is_owned_by(actor.user_id) {
            Ok(order)
        } else {
            Err(CheckoutError::OrderNotFound(order_id))
        }
    }

    /// The caller's orders, newest first. Admins see every order.
    pub async fn list_orders(&self, actor: &Actor) -> Result<Vec<OrderSummary>> {
        self.refresh_views().await?;
        if actor.is_admin() {
            Ok(self.user_orders.all_orders().await)
        } else {
            Ok(self.user_orders.orders_for(actor.user_id).await)
        }
    }

    /// Cancels unpaid gateway orders that have waited longer than the TTL.
    ///
    /// Returns how many orders were cancelled. Does nothing when no TTL is
    /// configured.
    #[tracing::instrument(skip(self))]
    pub async fn expire_stale_orders(&self, now: DateTime<Utc>) -> Result<usize> {
        let Some(ttl) = self.config.pending_order_ttl else {
            return Ok(0);
        };
        let cutoff = now - ttl;

        self.refresh_views().await?;
        let candidates = self.pending_orders.expirable_before(cutoff).await;

        let mut expired = 0;
        for order_id in candidates {
            let Some(order) = self.orders.get_order(order_id).await? else {
                continue;
            };
            if !is_expirable(&order, cutoff) {
                continue;
            }

            match self
                .transition(
                    order_id,
                    OrderStatus::Cancelled,
                    SYSTEM_ACTOR,
                    Some(EXPIRY_NOTE.to_string()),
                    Some(EXPIRABLE_FROM),
                )
                .await
            {
                Ok(_) => {
                    expired += 1;
                    metrics::counter!("orders_expired_total").increment(1);
                    tracing::info!(%order_id, "stale pending order expired");
                }
                Err(e) => {
                    tracing::warn!(%order_id, error = %e, "stale order left as is");
                }
            }
        }

        Ok(expired)
    }

    /// Applies a legal transition and runs its side effects.
    #[tracing::instrument(skip(self, note, only_from))]
    pub async fn transition(
        &self,
        order_id: AggregateId,
        requested: OrderStatus,
        actor: &str,
        note: Option<String>,
        only_from: Option<&'static [OrderStatus]>,
    ) -> Result<Order> {
        let mut cmd = ChangeStatus::new(order_id, requested, actor).with_optional_note(note);
        if let Some(allowed) = only_from {
            cmd = cmd.only_from(allowed);
        }

        let result = self
            .orders
            .change_status(cmd)
            .await
            .map_err(|e| CheckoutError::from_domain(order_id, e))?;

        metrics::counter!("order_transitions_total", "to" => requested.as_str()).increment(1);
        tracing::info!(%order_id, to = %requested, retries = result.retries, "order status changed");

        let cancelled_here = result.events.iter().any(|event| {
            matches!(event, OrderEvent::StatusChanged(data) if data.to == OrderStatus::Cancelled)
        });

        let mut order = result.aggregate;
        if cancelled_here {
            order = self.restock(order_id, order).await;
        }

        self.notify(order_id, &order);
        Ok(order)
    }

    /// Gives a cancelled order's stock back and records that it did.
    ///
    /// Failures are logged and leave `stock_restored` unset.
    async fn restock(&self, order_id: AggregateId, order: Order) -> Order {
        if order.stock_restored() {
            return order;
        }

        let units: Vec<RestoredUnit> = order.reserved_units();
        let items: Vec<ReservationItem> = units
            .iter()
            .map(|u| ReservationItem::new(u.unit.clone(), u.quantity))
            .collect();

        if let Err(e) = self.ledger.restore(&items).await {
            tracing::error!(
                %order_id,
                error = %e,
                "restock after cancellation failed, manual reconciliation required"
            );
            return order;
        }

        let cmd = MarkStockRestored {
            order_id,
            units,
            actor: SYSTEM_ACTOR.to_string(),
        };
        match self.orders.mark_stock_restored(cmd).await {
            Ok(result) => result.aggregate,
            Err(e) => {
                tracing::error!(%order_id, error = %e, "stock restored but not recorded on the order");
                order
            }
        }
    }

    fn notify(&self, order_id: AggregateId, order: &Order) {
        let status = order.status();
        if !StatusNotification::is_notifiable(status) {
            return;
        }
        let (Some(user_id), Some(number)) = (order.user_id(), order.order_number()) else {
            return;
        };
        notifier::dispatch(
            Arc::clone(&self.notifier),
            StatusNotification {
                user_id,
                order_id,
                order_number: number.as_str().to_string(),
                status,
            },
        );
    }

    async fn load(&self, order_id: AggregateId) -> Result<Order> {
        self.orders
            .get_order(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))
    }
}

/// Re-checks a candidate from the pending index against the aggregate.
fn is_expirable(order: &Order, cutoff: DateTime<Utc>) -> bool {
    let awaits_cash = order.payment_method() == Some(GatewayId::Cod)
        || order
            .active_payment()
            .is_some_and(|p| p.gateway == GatewayId::Cod);

    order.status() == OrderStatus::Pending
        && !order.is_paid()
        && !awaits_cash
        && order.created_at().is_some_and(|placed| placed < cutoff)
}

fn view_processor<S: EventStore + Clone + 'static>(
    store: &S,
    config: &CheckoutConfig,
    user_orders: &UserOrdersView,
    pending_orders: &PendingOrdersView,
) -> Arc<ProjectionProcessor<S>> {
    let mut processor =
        ProjectionProcessor::new(store.clone()).with_gap_timeout(config.projection_gap_timeout);
    processor.register(Box::new(user_orders.clone()));
    processor.register(Box::new(pending_orders.clone()));
    Arc::new(processor)
}
