//! Background sweep that cancels stale unpaid orders.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use checkout::OrderLifecycle;
use event_store::EventStore;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Runs `expire_stale_orders` every `every` until `shutdown` flips to true
/// or its sender is dropped. Sweep errors are logged and the loop continues.
pub async fn run_expiry_sweeps<S: EventStore + Clone + 'static>(
    lifecycle: Arc<OrderLifecycle<S>>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(every_secs = every.as_secs(), "order expiry sweeps started");

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                match lifecycle.expire_stale_orders(Utc::now()).await {
                    Ok(0) => {}
                    Ok(expired) => tracing::info!(expired, "expired stale pending orders"),
                    Err(e) => tracing::error!(error = %e, "order expiry sweep failed"),
                }
            }
        }
    }

    tracing::info!("order expiry sweeps stopped");
}
