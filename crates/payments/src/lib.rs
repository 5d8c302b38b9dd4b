//! Payments: gateway integrations and reconciliation of their answers.
//!
//! - [`PaymentGateway`] is implemented for cash on delivery, eSewa and Khalti
//! - [`GatewayRegistry`] holds the enabled gateways
//! - [`Reconciler`] applies verified results to orders, idempotently
//! - [`PaymentsService`] is the use-case API the HTTP layer calls

pub mod config;
pub mod error;
pub mod gateway;
pub mod gateways;
pub mod reconcile;
pub mod registry;
pub mod service;

pub use config::{CodConfig, EsewaConfig, GatewaysConfig, KhaltiConfig};
pub use error::{GatewayError, PaymentError, ReconcileError, Result};
pub use gateway::{
    CallbackPayload, InitiateRequest, Initiation, PayerInfo, PaymentGateway, PaymentMethodInfo,
    VerifiedOutcome, VerifiedPayment,
};
pub use reconcile::Reconciler;
pub use registry::GatewayRegistry;
pub use service::{CallbackOutcome, PaymentSession, PaymentsService};
