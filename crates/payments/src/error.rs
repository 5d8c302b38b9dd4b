//! Payment error types.

use checkout::CheckoutError;
use common::{AggregateId, Money};
use domain::{DomainError, GatewayId, OrderError, PaymentStatus};
use thiserror::Error;

/// Failures talking to, or trusting, a payment provider.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment method {0} is not available")]
    Disabled(GatewayId),

    /// The provider's answer could not be trusted, or is not final yet.
    #[error("payment verification failed: {0}")]
    VerificationFailed(String),

    #[error("payment provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("payment provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid gateway configuration: {0}")]
    Config(String),
}

impl GatewayError {
    pub fn verification(reason: impl Into<String>) -> Self {
        GatewayError::VerificationFailed(reason.into())
    }

    /// Short label for the `reason` metric dimension.
    pub fn reason(&self) -> &'static str {
        match self {
            GatewayError::Disabled(_) => "disabled",
            GatewayError::VerificationFailed(_) => "verification_failed",
            GatewayError::Provider { .. } => "provider_error",
            GatewayError::Http(_) => "http_error",
            GatewayError::Config(_) => "config",
        }
    }
}

/// Why a verified gateway result could not be applied to its order.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("order {0} not found")]
    OrderNotFound(AggregateId),

    #[error("payment attempt {attempt} not found on order {order_id}")]
    PaymentNotFound { order_id: AggregateId, attempt: u32 },

    #[error("payment attempt {attempt} is already {status}")]
    AlreadyReconciled { attempt: u32, status: PaymentStatus },

    #[error("amount mismatch: expected {expected}, gateway reported {actual}")]
    AmountMismatch { expected: Money, actual: Money },

    #[error("gateway mismatch for payment attempt {attempt}: {reason}")]
    GatewayMismatch { attempt: u32, reason: String },

    #[error(transparent)]
    Domain(DomainError),
}

impl ReconcileError {
    pub(crate) fn from_domain(order_id: AggregateId, err: DomainError) -> Self {
        match err {
            DomainError::Order(OrderError::NotCreated) => ReconcileError::OrderNotFound(order_id),
            DomainError::Order(OrderError::PaymentNotFound { attempt }) => {
                ReconcileError::PaymentNotFound { order_id, attempt }
            }
            DomainError::Order(OrderError::AlreadyReconciled { attempt, status }) => {
                ReconcileError::AlreadyReconciled { attempt, status }
            }
            DomainError::Order(OrderError::AmountMismatch { expected, actual }) => {
                ReconcileError::AmountMismatch { expected, actual }
            }
            DomainError::Order(OrderError::GatewayMismatch { attempt, reason }) => {
                ReconcileError::GatewayMismatch { attempt, reason }
            }
            other => ReconcileError::Domain(other),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ReconcileError::Domain(e) if e.is_conflict())
    }
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("order {0} not found")]
    OrderNotFound(AggregateId),

    #[error("payment method {0} is not available")]
    GatewayDisabled(GatewayId),

    #[error("not allowed: {0}")]
    Unauthorized(String),

    #[error("payment reference belongs to order {actual}, not {expected}")]
    ReferenceMismatch {
        expected: AggregateId,
        actual: AggregateId,
    },

    #[error(transparent)]
    Gateway(GatewayError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error(transparent)]
    Domain(DomainError),
}

impl From<GatewayError> for PaymentError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Disabled(id) => PaymentError::GatewayDisabled(id),
            other => PaymentError::Gateway(other),
        }
    }
}

impl PaymentError {
    pub(crate) fn from_domain(order_id: AggregateId, err: DomainError) -> Self {
        match err {
            DomainError::Order(OrderError::NotCreated) => PaymentError::OrderNotFound(order_id),
            other => PaymentError::Domain(other),
        }
    }

    /// The aggregate's rejection, wherever it surfaced.
    pub fn as_order_error(&self) -> Option<&OrderError> {
        match self {
            PaymentError::Domain(e) => e.as_order_error(),
            PaymentError::Checkout(e) => e.as_order_error(),
            PaymentError::Reconcile(ReconcileError::Domain(e)) => e.as_order_error(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;
