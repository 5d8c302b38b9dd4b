//! Payment use cases: initiation, callbacks, client verification, COD, refunds.

use std::sync::Arc;

use checkout::{Actor, OrderLifecycle};
use common::AggregateId;
use domain::{
    CollectCashPayment, DomainError, GatewayId, Order, OrderError, OrderStatus, PaymentReference,
    PaymentStatus, RefundPayment, StartPayment,
};
use event_store::EventStore;
use serde::Serialize;

use crate::config::GatewaysConfig;
use crate::error::{GatewayError, PaymentError, ReconcileError, Result};
use crate::gateway::{
    CallbackPayload, InitiateRequest, Initiation, PayerInfo, PaymentGateway, PaymentMethodInfo,
    VerifiedOutcome, VerifiedPayment,
};
use crate::reconcile::Reconciler;
use crate::registry::GatewayRegistry;

/// A recorded attempt and what the customer does next.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentSession {
    pub order_id: AggregateId,
    pub attempt: u32,
    pub status: PaymentStatus,
    #[serde(flatten)]
    pub initiation: Initiation,
}

/// Result of applying a gateway's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallbackOutcome {
    pub success: bool,
    pub order_id: AggregateId,
    pub message: String,
}

pub struct PaymentsService<S: EventStore + Clone + 'static> {
    lifecycle: Arc<OrderLifecycle<S>>,
    registry: GatewayRegistry,
    reconciler: Reconciler<S>,
    config: GatewaysConfig,
}

impl<S: EventStore + Clone + 'static> PaymentsService<S> {
    pub fn new(
        lifecycle: Arc<OrderLifecycle<S>>,
        registry: GatewayRegistry,
        config: GatewaysConfig,
    ) -> Self {
        let reconciler = Reconciler::new(lifecycle.orders().clone());
        Self {
            lifecycle,
            registry,
            reconciler,
            config,
        }
    }

    pub fn registry(&self) -> &GatewayRegistry {
        &self.registry
    }

    pub fn lifecycle(&self) -> &Arc<OrderLifecycle<S>> {
        &self.lifecycle
    }

    pub fn available_methods(&self) -> Vec<PaymentMethodInfo> {
        self.registry.available_methods()
    }

    /// Starts a payment attempt for the owner's pending, unpaid order.
    ///
    /// The gateway is told the attempt number before it is recorded; a
    /// concurrent initiation for the same order loses with `StaleAttempt`.
    #[tracing::instrument(skip(self, actor, payer), fields(user_id = %actor.user_id))]
    pub async fn initiate_payment(
        &self,
        actor: &Actor,
        order_id: AggregateId,
        gateway: GatewayId,
        payer: PayerInfo,
    ) -> Result<PaymentSession> {
        let provider = self.registry.get(gateway)?;
        let order = self.load(order_id).await?;
        if !order.is_owned_by(actor.user_id) {
            return Err(PaymentError::Unauthorized(
                "only the order owner can pay for it".to_string(),
            ));
        }
        if order.status() != OrderStatus::Pending {
            return Err(PaymentError::Domain(DomainError::Order(
                OrderError::OrderNotPayable {
                    status: order.status(),
                },
            )));
        }
        if order.is_paid() {
            return Err(PaymentError::Domain(DomainError::Order(OrderError::AlreadyPaid)));
        }
        let Some(pricing) = order.pricing().copied() else {
            return Err(PaymentError::OrderNotFound(order_id));
        };

        let attempt = order.next_attempt();
        let currency = self.lifecycle.config().currency.clone();
        let request = InitiateRequest {
            reference: PaymentReference::new(order_id, attempt),
            order_number: order
                .order_number()
                .map(|n| n.as_str().to_string())
                .unwrap_or_default(),
            total: pricing.total(),
            tax: pricing.tax(),
            shipping: pricing.shipping_cost(),
            currency: currency.clone(),
            callback_url: self.config.callback_url(gateway.as_str())?,
            payer,
        };
        let initiation = provider.initiate(&request).await?;

        let status = if initiation.manual {
            PaymentStatus::Pending
        } else {
            PaymentStatus::Initiated
        };
        self.lifecycle
            .orders()
            .start_payment(StartPayment {
                order_id,
                attempt,
                gateway,
                currency,
                status,
                gateway_reference: initiation.gateway_reference.clone(),
                gateway_response: initiation.gateway_response.clone(),
                actor: actor.actor_name(),
            })
            .await
            .map_err(|e| PaymentError::from_domain(order_id, e))?;

        metrics::counter!("payments_initiated_total", "gateway" => gateway.as_str()).increment(1);
        tracing::info!(%order_id, attempt, %gateway, "payment initiated");

        Ok(PaymentSession {
            order_id,
            attempt,
            status,
            initiation,
        })
    }

    /// Provider redirect or webhook. The payload is verified with the
    /// provider before anything is applied.
    #[tracing::instrument(skip(self, payload))]
    pub async fn handle_callback(
        &self,
        gateway: GatewayId,
        payload: CallbackPayload,
    ) -> Result<CallbackOutcome> {
        let provider = self.registry.get(gateway)?;
        let verified = verify(provider.as_ref(), &payload).await?;
        self.settle(verified).await
    }

    /// Client-side confirmation by the order owner, same rules as a callback.
    #[tracing::instrument(skip(self, actor, payload), fields(user_id = %actor.user_id))]
    pub async fn verify_payment(
        &self,
        actor: &Actor,
        order_id: AggregateId,
        gateway: GatewayId,
        payload: CallbackPayload,
    ) -> Result<CallbackOutcome> {
        let order = self.load(order_id).await?;
        if !order.is_owned_by(actor.user_id) {
            return Err(PaymentError::Unauthorized(
                "only the order owner can verify its payment".to_string(),
            ));
        }

        let provider = self.registry.get(gateway)?;
        let verified = verify(provider.as_ref(), &payload).await?;
        let actual = verified.reference().order_id;
        if actual != order_id {
            metrics::counter!("payment_callbacks_rejected_total", "gateway" => gateway.as_str(), "reason" => "reference_mismatch")
                .increment(1);
            return Err(PaymentError::ReferenceMismatch {
                expected: order_id,
                actual,
            });
        }
        self.settle(verified).await
    }

    /// Courier collected the cash. The order status is left alone.
    #[tracing::instrument(skip(self, actor), fields(admin = %actor.user_id))]
    pub async fn mark_cod_collected(&self, actor: &Actor, order_id: AggregateId) -> Result<Order> {
        if !actor.is_admin() {
            return Err(PaymentError::Unauthorized(
                "only admins can mark cash as collected".to_string(),
            ));
        }

        let result = self
            .lifecycle
            .orders()
            .collect_cash_payment(CollectCashPayment {
                order_id,
                currency: self.lifecycle.config().currency.clone(),
                actor: actor.actor_name(),
            })
            .await
            .map_err(|e| PaymentError::from_domain(order_id, e))?;

        if result.changed() {
            metrics::counter!("payments_reconciled_total", "gateway" => GatewayId::Cod.as_str(), "outcome" => "completed")
                .increment(1);
            tracing::info!(%order_id, "cash on delivery collected");
        }
        Ok(result.aggregate)
    }

    /// Records that the captured payment was returned.
    ///
    /// An order that can still be cancelled is cancelled first, which
    /// restocks it. Shipped and delivered orders are rejected.
    #[tracing::instrument(skip(self, actor, reason), fields(admin = %actor.user_id))]
    pub async fn refund_payment(
        &self,
        actor: &Actor,
        order_id: AggregateId,
        reason: Option<String>,
    ) -> Result<Order> {
        if !actor.is_admin() {
            return Err(PaymentError::Unauthorized(
                "only admins can refund payments".to_string(),
            ));
        }

        let order = self.load(order_id).await?;
        if order.completed_payment().is_none() {
            return Err(PaymentError::Domain(DomainError::Order(
                OrderError::NothingToRefund,
            )));
        }
        if order.can_be_cancelled() {
            self.lifecycle
                .update_status(actor, order_id, OrderStatus::Cancelled, reason.clone())
                .await?;
        }

        let result = self
            .lifecycle
            .orders()
            .refund_payment(RefundPayment {
                order_id,
                reason,
                actor: actor.actor_name(),
            })
            .await
            .map_err(|e| PaymentError::from_domain(order_id, e))?;

        metrics::counter!("payments_reconciled_total", "gateway" => "any", "outcome" => "refunded")
            .increment(1);
        tracing::info!(%order_id, "payment refunded");
        Ok(result.aggregate)
    }

    async fn settle(&self, verified: VerifiedPayment) -> Result<CallbackOutcome> {
        let order_id = verified.reference().order_id;
        match self.reconciler.reconcile(&verified).await {
            Ok(order) => {
                let paid = order
                    .payment_attempt(verified.reference().attempt)
                    .is_some_and(|p| p.status.is_settled());
                let message = match verified.outcome() {
                    _ if paid => "payment confirmed".to_string(),
                    VerifiedOutcome::Failed { reason } => reason.clone(),
                    VerifiedOutcome::Captured { .. } => "payment not applied".to_string(),
                };
                Ok(CallbackOutcome {
                    success: paid,
                    order_id,
                    message,
                })
            }
            // A late failure for a captured attempt: the capture stands.
            Err(ReconcileError::AlreadyReconciled { status, .. }) if status.is_settled() => {
                Ok(CallbackOutcome {
                    success: true,
                    order_id,
                    message: "payment already confirmed".to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn load(&self, order_id: AggregateId) -> Result<Order> {
        self.lifecycle
            .orders()
            .get_order(order_id)
            .await
            .map_err(PaymentError::Domain)?
            .ok_or(PaymentError::OrderNotFound(order_id))
    }
}

async fn verify(
    provider: &dyn PaymentGateway,
    payload: &CallbackPayload,
) -> std::result::Result<VerifiedPayment, GatewayError> {
    provider.verify(payload).await.inspect_err(|e| {
        metrics::counter!("payment_callbacks_rejected_total", "gateway" => provider.id().as_str(), "reason" => e.reason())
            .increment(1);
        tracing::warn!(gateway = %provider.id(), error = %e, "gateway callback rejected");
    })
}
