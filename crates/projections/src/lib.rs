//! Query side of the order streams.
//!
//! - [`Projection`]: folds stored events into a view
//! - [`ProjectionProcessor`]: position-checkpointed catch-up from the event store
//! - [`UserOrdersView`]: order lists per user (admin sees all)
//! - [`PendingOrdersView`]: unpaid pending orders for the expiry sweep

pub mod error;
pub mod processor;
pub mod projection;
pub mod read_model;
pub mod views;

pub use error::{ProjectionError, Result};
pub use processor::{DEFAULT_GAP_TIMEOUT_SECS, ProjectionProcessor};
pub use projection::{Projection, ProjectionPosition};
pub use read_model::ReadModel;
pub use views::{OrderSummary, PendingOrder, PendingOrdersView, UserOrdersView};
