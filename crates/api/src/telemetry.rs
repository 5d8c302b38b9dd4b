//! Tracing subscriber and Prometheus recorder setup.

use metrics::describe_counter;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{AppConfig, LogFormat};

/// Installs the global subscriber. `RUST_LOG` directives win over the
/// configured level.
pub fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Installs the process-wide recorder and registers metric descriptions.
pub fn install_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    Ok(handle)
}

pub fn describe_metrics() {
    describe_counter!("orders_created_total", "Orders placed, by payment method");
    describe_counter!("orders_rejected_total", "Checkouts refused, by reason");
    describe_counter!(
        "order_transitions_total",
        "Applied order status transitions, by target status"
    );
    describe_counter!(
        "orders_expired_total",
        "Unpaid pending orders cancelled by the expiry sweep"
    );
    describe_counter!("payments_initiated_total", "Payment attempts started, by gateway");
    describe_counter!(
        "payments_reconciled_total",
        "Verified gateway results applied to orders, by gateway and outcome"
    );
    describe_counter!(
        "payment_callbacks_rejected_total",
        "Gateway callbacks that failed verification, by gateway and reason"
    );
    describe_counter!(
        "inventory_reservations_failed_total",
        "Stock reservations refused for lack of stock"
    );
    describe_counter!(
        "inventory_restore_failures_total",
        "Stock restores that failed and need manual reconciliation"
    );
    describe_counter!(
        "command_conflict_retries_total",
        "Order commands retried after a concurrent write"
    );
    describe_counter!(
        "projection_events_delivered_total",
        "Events delivered to read-model projections"
    );
}
