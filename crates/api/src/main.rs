//! API server entry point.

use std::sync::Arc;
use std::time::Duration;

use api::config::AppConfig;
use api::{AppState, expiry, telemetry};
use catalog::{
    CatalogSeed, InMemoryCartStore, InMemoryCatalog, InMemoryInventoryLedger, InventoryLedger,
    PostgresInventoryLedger,
};
use event_store::{EventStore, InMemoryEventStore, PostgresEventStore};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::watch;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() {
    // 1. Configuration, then tracing and the metrics recorder
    let _ = dotenvy::dotenv();
    let config = AppConfig::from_env().expect("invalid configuration");
    telemetry::init_tracing(&config);
    let metrics_handle =
        telemetry::install_metrics_recorder().expect("failed to install Prometheus recorder");

    // 2. Catalog seed
    let seed = match &config.catalog_seed_path {
        Some(path) => CatalogSeed::from_path(path).expect("failed to read catalog seed"),
        None => CatalogSeed::demo().expect("invalid demo catalog"),
    };
    let catalog = Arc::new(InMemoryCatalog::from_seed(&seed));
    tracing::info!(products = seed.products.len(), "catalog loaded");

    // 3. Storage: PostgreSQL when configured, in-memory otherwise
    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .acquire_timeout(Duration::from_secs(5))
                .connect(&url)
                .await
                .expect("failed to connect to PostgreSQL");
            let store = PostgresEventStore::new(pool.clone());
            store.run_migrations().await.expect("migrations failed");

            let ledger = Arc::new(PostgresInventoryLedger::new(pool));
            seed.apply_missing_stock(ledger.as_ref())
                .await
                .expect("failed to seed inventory");
            tracing::info!("using PostgreSQL storage");
            run(config, store, catalog, ledger, metrics_handle).await;
        }
        None => {
            let ledger = Arc::new(InMemoryInventoryLedger::new());
            seed.apply_stock(ledger.as_ref())
                .await
                .expect("failed to seed inventory");
            tracing::warn!("DATABASE_URL not set, using in-memory storage");
            run(config, InMemoryEventStore::new(), catalog, ledger, metrics_handle).await;
        }
    }
}

async fn run<S: EventStore + Clone + 'static>(
    config: AppConfig,
    store: S,
    catalog: Arc<InMemoryCatalog>,
    ledger: Arc<dyn InventoryLedger>,
    metrics_handle: PrometheusHandle,
) {
    let state = AppState::new(
        &config,
        store,
        catalog,
        Arc::new(InMemoryCartStore::new()),
        ledger,
    )
    .expect("invalid payment gateway configuration");
    let state = Arc::new(state);

    // Replay existing events into the read models
    state
        .lifecycle
        .refresh_views()
        .await
        .expect("projection catch-up failed");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeps = state.lifecycle.config().pending_order_ttl.map(|_| {
        tokio::spawn(expiry::run_expiry_sweeps(
            state.lifecycle.clone(),
            config.expiry_sweep_interval,
            shutdown_rx,
        ))
    });

    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    let _ = shutdown_tx.send(true);
    if let Some(sweeps) = sweeps {
        let _ = sweeps.await;
    }
    tracing::info!("server shut down gracefully");
}
