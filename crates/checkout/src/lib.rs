//! Checkout: from a cart to an order, and the order's status lifecycle.
//!
//! - [`snapshot`] freezes cart lines at current catalog prices
//! - [`OrderLifecycle`] reserves stock, places orders, applies status
//!   changes and restocks cancelled orders
//! - [`Notifier`] is the seam to the notification service

pub mod actor;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod notifier;
pub mod snapshot;

pub use actor::{Actor, Role};
pub use config::CheckoutConfig;
pub use error::{CheckoutError, Result};
pub use lifecycle::{CreateOrderRequest, OrderLifecycle};
pub use notifier::{InMemoryNotifier, LogNotifier, Notifier, NotifyError, StatusNotification};
pub use snapshot::snapshot;
