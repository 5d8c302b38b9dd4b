//! Order aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod payment;
mod service;
mod state;
mod value_objects;

pub use aggregate::Order;
pub use commands::*;
pub use events::{
    OrderEvent, OrderPlacedData, PaymentCancelledData, PaymentCompletedData, PaymentFailedData,
    PaymentInitiatedData, PaymentRefundedData, RestoredUnit, StatusChangedData,
    StockRestoredData,
};
pub use payment::{GatewayId, PaymentAttempt, PaymentReference, PaymentStatus, PaymentSummary};
pub use service::OrderService;
pub use state::OrderStatus;
pub use value_objects::{LineItem, OrderNumber, ShippingAddress, StatusEntry};

use common::Money;
use thiserror::Error;

/// Reasons the order aggregate rejects a command.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("order does not exist")]
    NotCreated,

    #[error("order already created")]
    AlreadyCreated,

    #[error("order has no items")]
    NoItems,

    #[error("cannot transition order from {current} to {requested}")]
    IllegalTransition {
        current: OrderStatus,
        requested: OrderStatus,
    },

    #[error("order cannot be paid while {status}")]
    OrderNotPayable { status: OrderStatus },

    #[error("order is already paid")]
    AlreadyPaid,

    /// Another payment attempt was started concurrently.
    #[error("payment attempt {actual} is stale, next attempt is {expected}")]
    StaleAttempt { expected: u32, actual: u32 },

    #[error("payment attempt {attempt} not found")]
    PaymentNotFound { attempt: u32 },

    #[error("gateway mismatch for payment attempt {attempt}: {reason}")]
    GatewayMismatch { attempt: u32, reason: String },

    #[error("amount mismatch: expected {expected}, gateway reported {actual}")]
    AmountMismatch { expected: Money, actual: Money },

    #[error("payment attempt {attempt} is already {status}")]
    AlreadyReconciled { attempt: u32, status: PaymentStatus },

    #[error("order is not paid cash on delivery")]
    NotCashOnDelivery,

    #[error("order has no completed payment to refund")]
    NothingToRefund,

    #[error("cannot refund an order that is {status}")]
    RefundNotAllowed { status: OrderStatus },

    #[error("order is {status}, stock is only restored for cancelled orders")]
    NotCancelled { status: OrderStatus },
}
