//! Gateway settings.

use std::time::Duration;

use url::Url;

use crate::error::GatewayError;

#[derive(Debug, Clone)]
pub struct GatewaysConfig {
    /// Public address of this service, used to build callback URLs.
    pub callback_base_url: String,
    pub http_timeout: Duration,
    pub cod: CodConfig,
    pub esewa: EsewaConfig,
    pub khalti: KhaltiConfig,
}

impl GatewaysConfig {
    /// Callback endpoint for one gateway, e.g. `{base}/payments/esewa/callback`.
    pub fn callback_url(&self, gateway: &str) -> Result<Url, GatewayError> {
        let base = format!("{}/", self.callback_base_url.trim_end_matches('/'));
        Url::parse(&base)
            .and_then(|base| base.join(&format!("payments/{gateway}/callback")))
            .map_err(|e| GatewayError::Config(format!("callback base url {base}: {e}")))
    }
}

impl Default for GatewaysConfig {
    fn default() -> Self {
        Self {
            callback_base_url: "http://localhost:3000".to_string(),
            http_timeout: Duration::from_secs(15),
            cod: CodConfig::default(),
            esewa: EsewaConfig::default(),
            khalti: KhaltiConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CodConfig {
    pub enabled: bool,
}

impl Default for CodConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Clone)]
pub struct EsewaConfig {
    pub enabled: bool,
    pub product_code: String,
    pub secret_key: String,
    /// Form action the customer's browser posts the signed fields to.
    pub form_url: String,
    /// Transaction status endpoint.
    pub status_url: String,
}

impl Default for EsewaConfig {
    /// Sandbox endpoints, disabled until a merchant secret is configured.
    fn default() -> Self {
        Self {
            enabled: false,
            product_code: "EPAYTEST".to_string(),
            secret_key: String::new(),
            form_url: "https://rc-epay.esewa.com.np/api/epay/main/v2/form".to_string(),
            status_url: "https://rc.esewa.com.np/api/epay/transaction/status/".to_string(),
        }
    }
}

impl std::fmt::Debug for EsewaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EsewaConfig")
            .field("enabled", &self.enabled)
            .field("product_code", &self.product_code)
            .field("secret_key", &"<redacted>")
            .field("form_url", &self.form_url)
            .field("status_url", &self.status_url)
            .finish()
    }
}

#[derive(Clone)]
pub struct KhaltiConfig {
    pub enabled: bool,
    pub secret_key: String,
    /// API root, e.g. `https://dev.khalti.com/api/v2`.
    pub base_url: String,
}

impl Default for KhaltiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            secret_key: String::new(),
            base_url: "https://dev.khalti.com/api/v2".to_string(),
        }
    }
}

impl std::fmt::Debug for KhaltiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KhaltiConfig")
            .field("enabled", &self.enabled)
            .field("secret_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}
