//! Order service: the command API over the order event streams.

use chrono::Utc;
use common::AggregateId;
use event_store::EventStore;

use crate::command::{CommandHandler, CommandResult};
use crate::error::DomainError;

use super::{
    ChangeStatus, CollectCashPayment, MarkStockRestored, Order, PlaceOrder,
    RecordPaymentFailure, RecordPaymentSuccess, RefundPayment, StartPayment,
};

/// Default number of reload-and-re-decide rounds after a lost append race.
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

/// Service for managing orders.
///
/// Every mutation is decided against freshly loaded state and appended with
/// an expected-version check. Conflicts are retried up to the configured
/// limit and then surfaced.
pub struct OrderService<S: EventStore> {
    handler: CommandHandler<S, Order>,
    max_conflict_retries: u32,
}

impl<S: EventStore> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }

    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    pub fn handler(&self) -> &CommandHandler<S, Order> {
        &self.handler
    }

    pub fn store(&self) -> &S {
        self.handler.store()
    }

    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn place_order(&self, cmd: PlaceOrder) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute(cmd.order_id, &cmd.actor, |order| order.place(&cmd, Utc::now()))
            .await
    }

    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, requested = %cmd.requested))]
    pub async fn change_status(
        &self,
        cmd: ChangeStatus,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute_with_retry(cmd.order_id, &cmd.actor, self.max_conflict_retries, |order| {
                order.change_status(&cmd, Utc::now())
            })
            .await
    }

    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, gateway = %cmd.gateway))]
    pub async fn start_payment(
        &self,
        cmd: StartPayment,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute_with_retry(cmd.order_id, &cmd.actor, self.max_conflict_retries, |order| {
                order.start_payment(&cmd, Utc::now())
            })
            .await
    }

    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, attempt = cmd.attempt))]
    pub async fn record_payment_success(
        &self,
        cmd: RecordPaymentSuccess,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute_with_retry(cmd.order_id, &cmd.actor, self.max_conflict_retries, |order| {
                order.record_payment_success(&cmd, Utc::now())
            })
            .await
    }

    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, attempt = cmd.attempt))]
    pub async fn record_payment_failure(
        &self,
        cmd: RecordPaymentFailure,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute_with_retry(cmd.order_id, &cmd.actor, self.max_conflict_retries, |order| {
                order.record_payment_failure(&cmd, Utc::now())
            })
            .await
    }

    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn collect_cash_payment(
        &self,
        cmd: CollectCashPayment,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute_with_retry(cmd.order_id, &cmd.actor, self.max_conflict_retries, |order| {
                order.collect_cash_payment(&cmd, Utc::now())
            })
            .await
    }

    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn refund_payment(
        &self,
        cmd: RefundPayment,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute_with_retry(cmd.order_id, &cmd.actor, self.max_conflict_retries, |order| {
                order.refund_payment(&cmd, Utc::now())
            })
            .await
    }

    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn mark_stock_restored(
        &self,
        cmd: MarkStockRestored,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute_with_retry(cmd.order_id, &cmd.actor, self.max_conflict_retries, |order| {
                order.mark_stock_restored(&cmd, Utc::now())
            })
            .await
    }

    /// Loads an order by ID. Returns `None` if it doesn't exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: AggregateId) -> Result<Option<Order>, DomainError> {
        self.handler.load_existing(order_id).await
    }
}

impl<S: EventStore + Clone> Clone for OrderService<S> {
    fn clone(&self) -> Self {
        Self {
            handler: CommandHandler::new(self.handler.store().clone()),
            max_conflict_retries: self.max_conflict_retries,
        }
    }
}
