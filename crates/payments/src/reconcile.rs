//! Applies verified gateway results to orders.

use domain::{
    Order, OrderService, OrderStatus, RecordPaymentFailure, RecordPaymentSuccess, SYSTEM_ACTOR,
};
use event_store::EventStore;

use crate::error::ReconcileError;
use crate::gateway::{VerifiedOutcome, VerifiedPayment};

/// Idempotent: replaying a result that was already applied changes nothing.
/// A failure never reverts a capture.
pub struct Reconciler<S: EventStore> {
    orders: OrderService<S>,
}

impl<S: EventStore> Reconciler<S> {
    pub fn new(orders: OrderService<S>) -> Self {
        Self { orders }
    }

    #[tracing::instrument(
        skip(self, verified),
        fields(
            reference = %verified.reference(),
            gateway = %verified.gateway(),
            captured = verified.is_captured(),
        )
    )]
    pub async fn reconcile(&self, verified: &VerifiedPayment) -> Result<Order, ReconcileError> {
        let reference = verified.reference();
        let order_id = reference.order_id;
        let gateway = verified.gateway();

        match verified.outcome() {
            VerifiedOutcome::Captured {
                amount,
                transaction_id,
                reference_id,
            } => {
                let cmd = RecordPaymentSuccess {
                    order_id,
                    attempt: reference.attempt,
                    gateway,
                    amount: *amount,
                    gateway_reference: verified.gateway_reference().map(str::to_string),
                    transaction_id: transaction_id.clone(),
                    reference_id: reference_id.clone(),
                    gateway_response: verified.raw().clone(),
                    actor: SYSTEM_ACTOR.to_string(),
                };
                let result = self
                    .orders
                    .record_payment_success(cmd)
                    .await
                    .map_err(|e| rejected(verified, e))?;

                if !result.changed() {
                    metrics::counter!("payments_reconciled_total", "gateway" => gateway.as_str(), "outcome" => "duplicate")
                        .increment(1);
                    tracing::debug!("capture already recorded");
                    return Ok(result.aggregate);
                }

                let order = result.aggregate;
                metrics::counter!("payments_reconciled_total", "gateway" => gateway.as_str(), "outcome" => "completed")
                    .increment(1);
                tracing::info!(status = %order.status(), "payment captured");

                if order.status() == OrderStatus::Cancelled {
                    tracing::warn!("payment captured for a cancelled order, refund required");
                }
                let captures = order
                    .payments()
                    .iter()
                    .filter(|p| p.status.is_settled())
                    .count();
                if captures > 1 {
                    tracing::warn!(captures, "order charged more than once, refund required");
                }
                Ok(order)
            }
            VerifiedOutcome::Failed { reason } => {
                let cmd = RecordPaymentFailure {
                    order_id,
                    attempt: reference.attempt,
                    gateway,
                    reason: reason.clone(),
                    gateway_response: verified.raw().clone(),
                    actor: SYSTEM_ACTOR.to_string(),
                };
                let result = self
                    .orders
                    .record_payment_failure(cmd)
                    .await
                    .map_err(|e| rejected(verified, e))?;

                let outcome = if result.changed() { "failed" } else { "duplicate" };
                metrics::counter!("payments_reconciled_total", "gateway" => gateway.as_str(), "outcome" => outcome)
                    .increment(1);
                tracing::info!(%reason, "payment failed");
                Ok(result.aggregate)
            }
        }
    }
}

fn rejected(verified: &VerifiedPayment, err: domain::DomainError) -> ReconcileError {
    let err = ReconcileError::from_domain(verified.reference().order_id, err);
    metrics::counter!("payments_reconciled_total", "gateway" => verified.gateway().as_str(), "outcome" => "rejected")
        .increment(1);
    match &err {
        ReconcileError::AlreadyReconciled { .. } => {
            tracing::warn!(error = %err, "late gateway result ignored");
        }
        ReconcileError::AmountMismatch { .. } | ReconcileError::GatewayMismatch { .. } => {
            tracing::warn!(error = %err, "gateway result does not match the attempt");
        }
        _ => tracing::info!(error = %err, "gateway result not applied"),
    }
    err
}
