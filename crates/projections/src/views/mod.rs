//! Query-side views over order streams.

pub mod pending_orders;
pub mod user_orders;

pub use pending_orders::{PendingOrder, PendingOrdersView};
pub use user_orders::{OrderSummary, UserOrdersView};
