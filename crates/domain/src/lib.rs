//! Domain layer for the storefront.
//!
//! - [`Aggregate`] / [`DomainEvent`] traits for event-sourced entities
//! - [`CommandHandler`] with optimistic-concurrency retry
//! - the [`Order`] aggregate, its status state machine and payment attempts
//! - [`PricingPolicy`] for order totals

pub mod aggregate;
pub mod command;
pub mod error;
pub mod order;
pub mod pricing;

pub use aggregate::{Aggregate, DomainEvent};
pub use command::{Command, CommandHandler, CommandResult};
pub use error::DomainError;
pub use order::{
    ChangeStatus, CollectCashPayment, GatewayId, LineItem, MarkStockRestored, Order, OrderError,
    OrderEvent, OrderNumber, OrderService, OrderStatus, PaymentAttempt, PaymentReference,
    PaymentStatus, PaymentSummary, PlaceOrder, RecordPaymentFailure, RecordPaymentSuccess,
    RefundPayment, RestoredUnit, SYSTEM_ACTOR, ShippingAddress, StartPayment, StatusEntry,
};
pub use pricing::{Pricing, PricingPolicy};
