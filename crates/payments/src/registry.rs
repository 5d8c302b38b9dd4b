//! The set of gateways this shop accepts.

use std::sync::Arc;

use domain::GatewayId;

use crate::config::GatewaysConfig;
use crate::error::GatewayError;
use crate::gateway::{PaymentGateway, PaymentMethodInfo};
use crate::gateways::{CodGateway, EsewaGateway, HttpEsewaStatusApi, HttpKhaltiApi, KhaltiGateway};

/// Gateways by id, in display order.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: Vec<Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds every configured gateway with HTTP clients for the providers.
    pub fn from_config(config: &GatewaysConfig) -> Result<Self, GatewayError> {
        if config.khalti.enabled && config.khalti.secret_key.trim().is_empty() {
            return Err(GatewayError::Config(
                "khalti is enabled but no secret key is set".to_string(),
            ));
        }
        if config.esewa.enabled && config.esewa.secret_key.trim().is_empty() {
            return Err(GatewayError::Config(
                "esewa is enabled but no secret key is set".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;

        let esewa_status = Arc::new(HttpEsewaStatusApi::new(
            client.clone(),
            config.esewa.status_url.clone(),
        ));
        let khalti_api = Arc::new(HttpKhaltiApi::new(
            client,
            &config.khalti.base_url,
            config.khalti.secret_key.clone(),
        ));

        Ok(Self::new()
            .register(Arc::new(CodGateway::new(config.cod.enabled)))
            .register(Arc::new(EsewaGateway::new(config.esewa.clone(), esewa_status)))
            .register(Arc::new(KhaltiGateway::new(config.khalti.clone(), khalti_api))))
    }

    /// Adds a gateway, replacing any with the same id.
    pub fn register(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.retain(|g| g.id() != gateway.id());
        self.gateways.push(gateway);
        self
    }

    /// An enabled gateway.
    pub fn get(&self, id: GatewayId) -> Result<Arc<dyn PaymentGateway>, GatewayError> {
        self.gateways
            .iter()
            .find(|g| g.id() == id && g.info().enabled)
            .cloned()
            .ok_or(GatewayError::Disabled(id))
    }

    /// Enabled methods, from configuration only.
    pub fn available_methods(&self) -> Vec<PaymentMethodInfo> {
        self.gateways
            .iter()
            .map(|g| g.info())
            .filter(|info| info.enabled)
            .collect()
    }

    pub fn enabled_ids(&self) -> Vec<GatewayId> {
        self.available_methods().into_iter().map(|m| m.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EsewaConfig, KhaltiConfig};

    fn with_esewa(enabled: bool, secret_key: &str) -> GatewaysConfig {
        GatewaysConfig {
            esewa: EsewaConfig {
                enabled,
                secret_key: secret_key.to_string(),
                ..EsewaConfig::default()
            },
            ..GatewaysConfig::default()
        }
    }

    #[test]
    fn disabled_gateways_are_hidden() {
        let registry = GatewayRegistry::from_config(&GatewaysConfig::default()).unwrap();

        assert_eq!(registry.enabled_ids(), vec![GatewayId::Cod]);
        assert!(matches!(
            registry.get(GatewayId::Khalti),
            Err(GatewayError::Disabled(GatewayId::Khalti))
        ));
        assert!(matches!(
            registry.get(GatewayId::Esewa),
            Err(GatewayError::Disabled(GatewayId::Esewa))
        ));
    }

    #[test]
    fn esewa_needs_a_secret() {
        for blank in ["", "  "] {
            assert!(matches!(
                GatewayRegistry::from_config(&with_esewa(true, blank)),
                Err(GatewayError::Config(msg)) if msg.contains("esewa")
            ));
        }
        assert!(GatewayRegistry::from_config(&with_esewa(false, "")).is_ok());
    }

    #[test]
    fn esewa_with_a_secret_is_offered() {
        let registry = GatewayRegistry::from_config(&with_esewa(true, "merchant-secret")).unwrap();

        assert_eq!(registry.enabled_ids(), vec![GatewayId::Cod, GatewayId::Esewa]);
        assert!(registry.get(GatewayId::Esewa).is_ok());
    }

    #[test]
    fn khalti_needs_a_secret() {
        let config = GatewaysConfig {
            khalti: KhaltiConfig {
                enabled: true,
                ..KhaltiConfig::default()
            },
            ..GatewaysConfig::default()
        };
        assert!(matches!(
            GatewayRegistry::from_config(&config),
            Err(GatewayError::Config(_))
        ));
    }
}
