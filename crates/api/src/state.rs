//! Shared application state.

use std::sync::Arc;

use catalog::{CartStore, Catalog, InventoryLedger};
use checkout::OrderLifecycle;
use event_store::EventStore;
use payments::{GatewayError, GatewayRegistry, PaymentsService};

use crate::config::AppConfig;

/// Services every handler reaches through `State<Arc<AppState<S>>>`.
pub struct AppState<S: EventStore + Clone + 'static> {
    pub lifecycle: Arc<OrderLifecycle<S>>,
    pub payments: PaymentsService<S>,
    /// Where payment callbacks send the customer's browser.
    pub frontend_url: String,
}

impl<S: EventStore + Clone + 'static> AppState<S> {
    /// Wires the services with gateways built from configuration.
    pub fn new(
        config: &AppConfig,
        store: S,
        catalog: Arc<dyn Catalog>,
        carts: Arc<dyn CartStore>,
        ledger: Arc<dyn InventoryLedger>,
    ) -> Result<Self, GatewayError> {
        let registry = GatewayRegistry::from_config(&config.gateways())?;
        Ok(Self::with_registry(config, store, catalog, carts, ledger, registry))
    }

    pub fn with_registry(
        config: &AppConfig,
        store: S,
        catalog: Arc<dyn Catalog>,
        carts: Arc<dyn CartStore>,
        ledger: Arc<dyn InventoryLedger>,
        registry: GatewayRegistry,
    ) -> Self {
        // Checkout offers exactly the methods the registry can take payment with.
        let lifecycle = OrderLifecycle::new(store, catalog, carts, ledger)
            .with_pricing(config.pricing.clone())
            .with_config(config.checkout(registry.enabled_ids()));
        let lifecycle = Arc::new(lifecycle);
        let payments = PaymentsService::new(lifecycle.clone(), registry, config.gateways());

        Self {
            lifecycle,
            payments,
            frontend_url: config.frontend_url.clone(),
        }
    }

    pub fn carts(&self) -> &Arc<dyn CartStore> {
        self.lifecycle.carts()
    }
}
