//! Application configuration loaded from environment variables.

use std::time::Duration;

use checkout::CheckoutConfig;
use common::Money;
use domain::{GatewayId, PricingPolicy};
use payments::{CodConfig, EsewaConfig, GatewaysConfig, KhaltiConfig};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid value for {key}: {value:?}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Server configuration. Every field has a default suitable for local runs.
///
/// Reads `HOST`, `PORT`, `RUST_LOG`, `LOG_FORMAT`, `DATABASE_URL`,
/// `FRONTEND_URL`, `PUBLIC_BASE_URL`, `CATALOG_SEED_PATH`, the pricing
/// variables (`CURRENCY`, `SHIPPING_FLAT_CENTS`,
/// `FREE_SHIPPING_THRESHOLD_CENTS`, `TAX_RATE_BPS`), the lifecycle variables
/// (`MAX_CONFLICT_RETRIES`, `PENDING_ORDER_TTL_MINUTES`,
/// `EXPIRY_SWEEP_INTERVAL_SECS`, `PROJECTION_GAP_TIMEOUT_SECS`) and the gateway variables (`COD_ENABLED`,
/// `ESEWA_*`, `KHALTI_*`).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    /// PostgreSQL for events and stock when set, in-memory otherwise.
    pub database_url: Option<String>,
    pub frontend_url: String,
    pub public_base_url: String,
    pub catalog_seed_path: Option<String>,
    pub currency: String,
    pub pricing: PricingPolicy,
    pub max_conflict_retries: u32,
    /// 0 disables expiry.
    pub pending_order_ttl_minutes: u64,
    pub expiry_sweep_interval: Duration,
    pub projection_gap_timeout_secs: u64,
    pub cod: CodConfig,
    pub esewa: EsewaConfig,
    pub khalti: KhaltiConfig,
}

impl AppConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from any key lookup, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let defaults_pricing = defaults.pricing.clone();
        let threshold = match get("FREE_SHIPPING_THRESHOLD_CENTS") {
            None => defaults_pricing.free_shipping_threshold,
            Some(v) => {
                let cents: i64 = parse_value("FREE_SHIPPING_THRESHOLD_CENTS", &v)?;
                (cents > 0).then(|| Money::from_minor(cents))
            }
        };
        let pricing = PricingPolicy {
            shipping_flat: Money::from_minor(parse_or(
                &get,
                "SHIPPING_FLAT_CENTS",
                defaults_pricing.shipping_flat.minor(),
            )?),
            free_shipping_threshold: threshold,
            tax_rate_bps: parse_or(&get, "TAX_RATE_BPS", defaults_pricing.tax_rate_bps)?,
        };

        let log_format = match get("LOG_FORMAT").as_deref() {
            None => LogFormat::default(),
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            Some(v) if v.eq_ignore_ascii_case("pretty") || v.eq_ignore_ascii_case("text") => {
                LogFormat::Pretty
            }
            Some(v) => {
                return Err(ConfigError {
                    key: "LOG_FORMAT",
                    value: v.to_string(),
                });
            }
        };

        // eSewa is on by default once a merchant secret is configured.
        let esewa_secret = get("ESEWA_SECRET_KEY");
        let esewa = EsewaConfig {
            enabled: parse_or(
                &get,
                "ESEWA_ENABLED",
                defaults.esewa.enabled || esewa_secret.is_some(),
            )?,
            product_code: get("ESEWA_PRODUCT_CODE").unwrap_or(defaults.esewa.product_code),
            secret_key: esewa_secret.unwrap_or(defaults.esewa.secret_key),
            form_url: get("ESEWA_FORM_URL").unwrap_or(defaults.esewa.form_url),
            status_url: get("ESEWA_STATUS_URL").unwrap_or(defaults.esewa.status_url),
        };
        let khalti = KhaltiConfig {
            enabled: parse_or(&get, "KHALTI_ENABLED", defaults.khalti.enabled)?,
            secret_key: get("KHALTI_SECRET_KEY").unwrap_or(defaults.khalti.secret_key),
            base_url: get("KHALTI_BASE_URL").unwrap_or(defaults.khalti.base_url),
        };

        Ok(Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: parse_or(&get, "PORT", defaults.port)?,
            log_level: get("RUST_LOG").unwrap_or(defaults.log_level),
            log_format,
            database_url: get("DATABASE_URL"),
            frontend_url: get("FRONTEND_URL").unwrap_or(defaults.frontend_url),
            public_base_url: get("PUBLIC_BASE_URL").unwrap_or(defaults.public_base_url),
            catalog_seed_path: get("CATALOG_SEED_PATH"),
            currency: get("CURRENCY").unwrap_or(defaults.currency),
            pricing,
            max_conflict_retries: parse_or(
                &get,
                "MAX_CONFLICT_RETRIES",
                defaults.max_conflict_retries,
            )?,
            pending_order_ttl_minutes: parse_or(
                &get,
                "PENDING_ORDER_TTL_MINUTES",
                defaults.pending_order_ttl_minutes,
            )?,
            expiry_sweep_interval: Duration::from_secs(parse_or(
                &get,
                "EXPIRY_SWEEP_INTERVAL_SECS",
                defaults.expiry_sweep_interval.as_secs(),
            )?),
            projection_gap_timeout_secs: parse_or(
                &get,
                "PROJECTION_GAP_TIMEOUT_SECS",
                defaults.projection_gap_timeout_secs,
            )?,
            cod: CodConfig {
                enabled: parse_or(&get, "COD_ENABLED", defaults.cod.enabled)?,
            },
            esewa,
            khalti,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn checkout(&self, enabled_methods: Vec<GatewayId>) -> CheckoutConfig {
        let gap_secs = i64::try_from(self.projection_gap_timeout_secs)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 1_000);
        CheckoutConfig {
            currency: self.currency.clone(),
            max_conflict_retries: self.max_conflict_retries,
            enabled_methods,
            projection_gap_timeout: chrono::Duration::seconds(gap_secs),
            ..CheckoutConfig::default()
        }
        .with_ttl_minutes(self.pending_order_ttl_minutes)
    }

    pub fn gateways(&self) -> GatewaysConfig {
        GatewaysConfig {
            callback_base_url: self.public_base_url.clone(),
            cod: self.cod.clone(),
            esewa: self.esewa.clone(),
            khalti: self.khalti.clone(),
            ..GatewaysConfig::default()
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let gateways = GatewaysConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            frontend_url: "http://localhost:5173".to_string(),
            public_base_url: gateways.callback_base_url,
            catalog_seed_path: None,
            currency: "NPR".to_string(),
            pricing: PricingPolicy::default(),
            max_conflict_retries: CheckoutConfig::default().max_conflict_retries,
            pending_order_ttl_minutes: 0,
            expiry_sweep_interval: Duration::from_secs(60),
            projection_gap_timeout_secs: projections::DEFAULT_GAP_TIMEOUT_SECS as u64,
            cod: gateways.cod,
            esewa: gateways.esewa,
            khalti: gateways.khalti,
        }
    }
}

fn parse_value<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError {
        key,
        value: value.to_string(),
    })
}

fn parse_or<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(key) {
        Some(value) => parse_value(key, &value),
        None => Ok(default),
    }
}
