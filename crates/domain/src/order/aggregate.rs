//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::pricing::Pricing;

use super::events::{
    OrderPlacedData, PaymentCompletedData, PaymentFailedData, PaymentInitiatedData,
    PaymentRefundedData, RestoredUnit, StockRestoredData,
};
use super::{
    ChangeStatus, CollectCashPayment, GatewayId, LineItem, MarkStockRestored, OrderError,
    OrderEvent, OrderNumber, OrderStatus, PaymentAttempt, PaymentStatus, PaymentSummary,
    PlaceOrder, RecordPaymentFailure, RecordPaymentSuccess, RefundPayment, ShippingAddress,
    StartPayment, StatusEntry,
};

/// Order aggregate root.
///
/// An order is created with its stock already reserved and then only moves
/// through status transitions and payment bookkeeping. It is never deleted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    id: Option<AggregateId>,
    #[serde(default)]
    version: Version,
    order_number: Option<OrderNumber>,
    user_id: Option<UserId>,
    items: Vec<LineItem>,
    pricing: Option<Pricing>,
    status: OrderStatus,
    status_history: Vec<StatusEntry>,
    payment_method: Option<GatewayId>,
    payments: Vec<PaymentAttempt>,
    shipping_address: Option<ShippingAddress>,
    created_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    cancellation_reason: Option<String>,
    delivered_at: Option<DateTime<Utc>>,
    stock_restored: bool,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            OrderEvent::OrderPlaced(data) => self.apply_order_placed(data),
            OrderEvent::StatusChanged(data) => {
                self.status = data.to;
                match data.to {
                    OrderStatus::Cancelled => {
                        self.cancelled_at.get_or_insert(data.changed_at);
                        if self.cancellation_reason.is_none() {
                            self.cancellation_reason = data.note.clone();
                        }
                    }
                    OrderStatus::Delivered => {
                        self.delivered_at.get_or_insert(data.changed_at);
                    }
                    _ => {}
                }
                self.status_history.push(StatusEntry {
                    status: data.to,
                    note: data.note,
                    actor: data.actor,
                    timestamp: data.changed_at,
                });
            }
            OrderEvent::PaymentInitiated(data) => self.apply_payment_initiated(data),
            OrderEvent::PaymentCompleted(data) => self.apply_payment_completed(data),
            OrderEvent::PaymentFailed(data) => self.apply_payment_failed(data),
            OrderEvent::PaymentCancelled(data) => {
                if let Some(attempt) = self.attempt_mut(data.attempt) {
                    attempt.status = PaymentStatus::Cancelled;
                }
            }
            OrderEvent::PaymentRefunded(data) => self.apply_payment_refunded(data),
            OrderEvent::StockRestored(_) => {
                self.stock_restored = true;
            }
        }
    }
}

// Query methods
impl Order {
    pub fn order_number(&self) -> Option<&OrderNumber> {
        self.order_number.as_ref()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == Some(user_id)
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn pricing(&self) -> Option<&Pricing> {
        self.pricing.as_ref()
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn status_history(&self) -> &[StatusEntry] {
        &self.status_history
    }

    /// True iff the status is pending, confirmed or processing.
    pub fn can_be_cancelled(&self) -> bool {
        self.status.can_be_cancelled()
    }

    pub fn payment_method(&self) -> Option<GatewayId> {
        self.payment_method
    }

    pub fn payments(&self) -> &[PaymentAttempt] {
        &self.payments
    }

    pub fn payment_attempt(&self, attempt: u32) -> Option<&PaymentAttempt> {
        self.payments.iter().find(|p| p.attempt == attempt)
    }

    /// The attempt that may still settle, if any. There is at most one.
    pub fn active_payment(&self) -> Option<&PaymentAttempt> {
        self.payments.iter().find(|p| p.status.is_active())
    }

    /// Most recent attempt that captured money and was not refunded.
    pub fn completed_payment(&self) -> Option<&PaymentAttempt> {
        self.payments
            .iter()
            .rev()
            .find(|p| p.status == PaymentStatus::Completed)
    }

    pub fn is_paid(&self) -> bool {
        self.completed_payment().is_some()
    }

    pub fn next_attempt(&self) -> u32 {
        self.payments.iter().map(|p| p.attempt).max().unwrap_or(0) + 1
    }

    /// Payment view: the settled attempt if there is one, else the latest
    /// attempt, else the method chosen at checkout.
    pub fn payment(&self) -> Option<PaymentSummary> {
        let attempt = self
            .payments
            .iter()
            .rev()
            .find(|p| p.status.is_settled())
            .or(self.payments.last());

        match attempt {
            Some(a) => Some(PaymentSummary {
                method: a.gateway,
                status: a.status,
                transaction_id: a.transaction_id.clone(),
                reference_id: a.reference_id.clone(),
                paid_at: a.paid_at,
            }),
            None => self.payment_method.map(|method| PaymentSummary {
                method,
                status: PaymentStatus::Initiated,
                transaction_id: None,
                reference_id: None,
                paid_at: None,
            }),
        }
    }

    pub fn shipping_address(&self) -> Option<&ShippingAddress> {
        self.shipping_address.as_ref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    pub fn stock_restored(&self) -> bool {
        self.stock_restored
    }

    /// Stock units and quantities this order holds in the ledger.
    pub fn reserved_units(&self) -> Vec<RestoredUnit> {
        self.items
            .iter()
            .map(|item| RestoredUnit {
                unit: item.unit(),
                quantity: item.quantity,
            })
            .collect()
    }
}

// Command methods (return events)
impl Order {
    pub fn place(&self, cmd: &PlaceOrder, now: DateTime<Utc>) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_some() {
            return Err(OrderError::AlreadyCreated);
        }
        if cmd.items.is_empty() {
            return Err(OrderError::NoItems);
        }

        Ok(vec![OrderEvent::OrderPlaced(OrderPlacedData {
            order_id: cmd.order_id,
            order_number: OrderNumber::generate(cmd.order_id, now.date_naive()),
            user_id: cmd.user_id,
            items: cmd.items.clone(),
            pricing: cmd.pricing,
            payment_method: cmd.payment_method,
            shipping_address: cmd.shipping_address.clone(),
            actor: cmd.actor.clone(),
            placed_at: now,
        })])
    }

    /// Validates a status change against the transition table.
    ///
    /// Cancelling also cancels the active payment attempt in the same batch.
    pub fn change_status(
        &self,
        cmd: &ChangeStatus,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;

        let restricted = cmd
            .only_from
            .is_some_and(|allowed| !allowed.contains(&self.status));
        if restricted || !self.status.can_transition_to(cmd.requested) {
            return Err(OrderError::IllegalTransition {
                current: self.status,
                requested: cmd.requested,
            });
        }

        let mut events = vec![OrderEvent::status_changed(
            self.status,
            cmd.requested,
            cmd.note.clone(),
            cmd.actor.clone(),
            now,
        )];

        if cmd.requested == OrderStatus::Cancelled
            && let Some(active) = self.active_payment()
        {
            events.push(OrderEvent::payment_cancelled(
                active.attempt,
                "order cancelled",
                now,
            ));
        }

        Ok(events)
    }

    /// Starts a payment attempt, cancelling the previous active one.
    pub fn start_payment(
        &self,
        cmd: &StartPayment,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;

        if self.status != OrderStatus::Pending {
            return Err(OrderError::OrderNotPayable {
                status: self.status,
            });
        }
        if self.is_paid() {
            return Err(OrderError::AlreadyPaid);
        }
        let expected = self.next_attempt();
        if cmd.attempt != expected {
            return Err(OrderError::StaleAttempt {
                expected,
                actual: cmd.attempt,
            });
        }

        let mut events = Vec::with_capacity(2);
        if let Some(active) = self.active_payment() {
            events.push(OrderEvent::payment_cancelled(
                active.attempt,
                format!("superseded by attempt {}", cmd.attempt),
                now,
            ));
        }

        events.push(OrderEvent::PaymentInitiated(PaymentInitiatedData {
            attempt: cmd.attempt,
            gateway: cmd.gateway,
            amount: self.total(),
            currency: cmd.currency.clone(),
            status: cmd.status,
            gateway_reference: cmd.gateway_reference.clone(),
            gateway_response: cmd.gateway_response.clone(),
            initiated_at: now,
        }));

        Ok(events)
    }

    /// Records a verified capture.
    ///
    /// Re-recording a completed attempt is a no-op. On success every other
    /// active attempt is cancelled and a pending order becomes confirmed in
    /// the same batch. A capture on a cancelled order is still recorded.
    pub fn record_payment_success(
        &self,
        cmd: &RecordPaymentSuccess,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        let attempt = self.verified_attempt(cmd.attempt, cmd.gateway)?;

        if let (Some(recorded), Some(reported)) =
            (&attempt.gateway_reference, &cmd.gateway_reference)
            && recorded != reported
        {
            return Err(OrderError::GatewayMismatch {
                attempt: cmd.attempt,
                reason: format!("session {reported} does not match {recorded}"),
            });
        }
        if let Some(amount) = cmd.amount
            && amount != attempt.amount
        {
            return Err(OrderError::AmountMismatch {
                expected: attempt.amount,
                actual: amount,
            });
        }

        match attempt.status {
            PaymentStatus::Completed => return Ok(vec![]),
            PaymentStatus::Refunded => {
                return Err(OrderError::AlreadyReconciled {
                    attempt: cmd.attempt,
                    status: attempt.status,
                });
            }
            _ => {}
        }

        let mut events = vec![OrderEvent::PaymentCompleted(PaymentCompletedData {
            attempt: cmd.attempt,
            transaction_id: cmd.transaction_id.clone(),
            reference_id: cmd.reference_id.clone(),
            gateway_response: cmd.gateway_response.clone(),
            paid_at: now,
        })];

        for other in self
            .payments
            .iter()
            .filter(|p| p.attempt != cmd.attempt && p.status.is_active())
        {
            events.push(OrderEvent::payment_cancelled(
                other.attempt,
                format!("superseded by completed attempt {}", cmd.attempt),
                now,
            ));
        }

        if self.status == OrderStatus::Pending {
            events.push(OrderEvent::status_changed(
                OrderStatus::Pending,
                OrderStatus::Confirmed,
                Some(format!("payment received via {}", cmd.gateway)),
                cmd.actor.clone(),
                now,
            ));
        }

        Ok(events)
    }

    /// Records a failed attempt. Failures never revert a capture.
    pub fn record_payment_failure(
        &self,
        cmd: &RecordPaymentFailure,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        let attempt = self.verified_attempt(cmd.attempt, cmd.gateway)?;

        match attempt.status {
            PaymentStatus::Completed | PaymentStatus::Refunded => {
                Err(OrderError::AlreadyReconciled {
                    attempt: cmd.attempt,
                    status: attempt.status,
                })
            }
            PaymentStatus::Failed | PaymentStatus::Cancelled => Ok(vec![]),
            PaymentStatus::Initiated | PaymentStatus::Pending => {
                Ok(vec![OrderEvent::PaymentFailed(PaymentFailedData {
                    attempt: cmd.attempt,
                    reason: cmd.reason.clone(),
                    gateway_response: cmd.gateway_response.clone(),
                    failed_at: now,
                })])
            }
        }
    }

    /// Marks a cash-on-delivery payment as collected. Leaves the order status alone.
    ///
    /// If the COD attempt was never recorded explicitly, it is recorded and
    /// completed in one batch.
    pub fn collect_cash_payment(
        &self,
        cmd: &CollectCashPayment,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;

        if self.status == OrderStatus::Cancelled {
            return Err(OrderError::OrderNotPayable {
                status: self.status,
            });
        }

        let cod_settled = self
            .payments
            .iter()
            .any(|p| p.gateway == GatewayId::Cod && p.status.is_settled());
        if cod_settled {
            return Ok(vec![]);
        }
        if self.is_paid() {
            return Err(OrderError::AlreadyPaid);
        }

        let completed = |attempt: u32| {
            OrderEvent::PaymentCompleted(PaymentCompletedData {
                attempt,
                transaction_id: None,
                reference_id: None,
                gateway_response: serde_json::json!({"collected_by": cmd.actor}),
                paid_at: now,
            })
        };

        match self.active_payment() {
            Some(active) if active.gateway == GatewayId::Cod => Ok(vec![completed(active.attempt)]),
            Some(_) => Err(OrderError::NotCashOnDelivery),
            None if self.payment_method == Some(GatewayId::Cod) => {
                let attempt = self.next_attempt();
                Ok(vec![
                    OrderEvent::PaymentInitiated(PaymentInitiatedData {
                        attempt,
                        gateway: GatewayId::Cod,
                        amount: self.total(),
                        currency: cmd.currency.clone(),
                        status: PaymentStatus::Pending,
                        gateway_reference: None,
                        gateway_response: serde_json::Value::Null,
                        initiated_at: now,
                    }),
                    completed(attempt),
                ])
            }
            None => Err(OrderError::NotCashOnDelivery),
        }
    }

    /// Records that a captured payment was given back.
    pub fn refund_payment(
        &self,
        cmd: &RefundPayment,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;

        if matches!(self.status, OrderStatus::Shipped | OrderStatus::Delivered) {
            return Err(OrderError::RefundNotAllowed {
                status: self.status,
            });
        }

        let completed = self.completed_payment().ok_or(OrderError::NothingToRefund)?;

        Ok(vec![OrderEvent::PaymentRefunded(PaymentRefundedData {
            attempt: completed.attempt,
            reason: cmd.reason.clone(),
            actor: cmd.actor.clone(),
            refunded_at: now,
        })])
    }

    /// Records the stock restore of a cancelled order. Idempotent.
    pub fn mark_stock_restored(
        &self,
        cmd: &MarkStockRestored,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;

        if self.stock_restored {
            return Ok(vec![]);
        }
        if self.status != OrderStatus::Cancelled {
            return Err(OrderError::NotCancelled {
                status: self.status,
            });
        }

        Ok(vec![OrderEvent::StockRestored(StockRestoredData {
            units: cmd.units.clone(),
            restored_at: now,
        })])
    }

    fn ensure_created(&self) -> Result<(), OrderError> {
        if self.id.is_none() {
            return Err(OrderError::NotCreated);
        }
        Ok(())
    }

    fn total(&self) -> common::Money {
        self.pricing
            .map(|p| p.total())
            .unwrap_or_else(common::Money::zero)
    }

    fn verified_attempt(
        &self,
        attempt: u32,
        gateway: GatewayId,
    ) -> Result<&PaymentAttempt, OrderError> {
        let recorded = self
            .payment_attempt(attempt)
            .ok_or(OrderError::PaymentNotFound { attempt })?;

        if recorded.gateway != gateway {
            return Err(OrderError::GatewayMismatch {
                attempt,
                reason: format!(
                    "attempt was started with {}, verified by {}",
                    recorded.gateway, gateway
                ),
            });
        }

        Ok(recorded)
    }
}

// Apply event helpers
impl Order {
    fn apply_order_placed(&mut self, data: OrderPlacedData) {
        self.id = Some(data.order_id);
        self.order_number = Some(data.order_number);
        self.user_id = Some(data.user_id);
        self.items = data.items;
        self.pricing = Some(data.pricing);
        self.status = OrderStatus::Pending;
        self.payment_method = Some(data.payment_method);
        self.shipping_address = data.shipping_address;
        self.created_at = Some(data.placed_at);
        self.status_history.push(StatusEntry {
            status: OrderStatus::Pending,
            note: Some("order placed".to_string()),
            actor: data.actor,
            timestamp: data.placed_at,
        });
    }

    fn apply_payment_initiated(&mut self, data: PaymentInitiatedData) {
        let mut responses = Vec::new();
        if !data.gateway_response.is_null() {
            responses.push(data.gateway_response);
        }

        self.payments.push(PaymentAttempt {
            attempt: data.attempt,
            gateway: data.gateway,
            amount: data.amount,
            currency: data.currency,
            status: data.status,
            transaction_id: None,
            reference_id: None,
            gateway_reference: data.gateway_reference,
            gateway_response: serde_json::Value::Array(responses),
            initiated_at: data.initiated_at,
            paid_at: None,
        });
    }

    fn apply_payment_completed(&mut self, data: PaymentCompletedData) {
        if let Some(attempt) = self.attempt_mut(data.attempt) {
            attempt.status = PaymentStatus::Completed;
            attempt.transaction_id = data.transaction_id;
            attempt.reference_id = data.reference_id;
            attempt.paid_at = Some(data.paid_at);
            push_response(&mut attempt.gateway_response, data.gateway_response);
        }
    }

    fn apply_payment_failed(&mut self, data: PaymentFailedData) {
        if let Some(attempt) = self.attempt_mut(data.attempt) {
            attempt.status = PaymentStatus::Failed;
            push_response(&mut attempt.gateway_response, data.gateway_response);
        }
    }

    fn apply_payment_refunded(&mut self, data: PaymentRefundedData) {
        if let Some(attempt) = self.attempt_mut(data.attempt) {
            attempt.status = PaymentStatus::Refunded;
        }
    }

    fn attempt_mut(&mut self, attempt: u32) -> Option<&mut PaymentAttempt> {
        self.payments.iter_mut().find(|p| p.attempt == attempt)
    }
}

/// Appends a provider payload to an attempt's audit trail.
fn push_response(trail: &mut serde_json::Value, response: serde_json::Value) {
    if response.is_null() {
        return;
    }
    match trail {
        serde_json::Value::Array(entries) => entries.push(response),
        other => *other = serde_json::Value::Array(vec![other.take(), response]),
    }
}
