//! Checkout settings.

use chrono::Duration;
use domain::GatewayId;
use projections::DEFAULT_GAP_TIMEOUT_SECS;

#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// ISO currency code recorded on payments.
    pub currency: String,
    /// Reload-and-re-decide rounds after a lost append race.
    pub max_conflict_retries: u32,
    /// Unpaid pending orders older than this are cancelled. `None` disables expiry.
    pub pending_order_ttl: Option<Duration>,
    /// Payment methods a customer may choose at checkout.
    pub enabled_methods: Vec<GatewayId>,
    /// How long the read models wait for a hole in the event log to fill.
    pub projection_gap_timeout: Duration,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            currency: "NPR".to_string(),
            max_conflict_retries: 3,
            pending_order_ttl: None,
            enabled_methods: GatewayId::ALL.to_vec(),
            projection_gap_timeout: Duration::seconds(DEFAULT_GAP_TIMEOUT_SECS),
        }
    }
}

impl CheckoutConfig {
    /// Builds the TTL from minutes, where zero means disabled.
    pub fn with_ttl_minutes(mut self, minutes: u64) -> Self {
        self.pending_order_ttl = match minutes {
            0 => None,
            m => {
                let minutes = i64::try_from(m).unwrap_or(i64::MAX).min(i64::MAX / 60_000);
                Some(Duration::minutes(minutes))
            }
        };
        self
    }

    pub fn accepts(&self, method: GatewayId) -> bool {
        self.enabled_methods.contains(&method)
    }
}
