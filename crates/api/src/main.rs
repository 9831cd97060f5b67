//! API server entry point.

use std::sync::Arc;

use aggregates::{InMemoryProductCatalog, PostgresProductCatalog, ProductCatalog};
use api::config::{Config, LogFormat};
use category_store::{CategoryStore, InMemoryCategoryStore, PostgresCategoryStore};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

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

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let (plain, json) = match config.log_format {
        LogFormat::Plain => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .init();
}

/// Builds the app over `store` and `catalog` and serves it until shutdown.
async fn serve<S: CategoryStore + 'static, P: ProductCatalog + 'static>(
    store: S,
    catalog: P,
    config: Config,
    metrics_handle: PrometheusHandle,
) {
    let state = api::create_default_state(store, catalog, config.engine());

    // Report inconsistencies left behind by earlier runs or manual edits.
    match state.service.validate_tree().await {
        Ok(report) if !report.is_clean() => tracing::warn!(
            issues = report.issues.len(),
            "category tree has issues, run POST /categories/repair"
        ),
        Ok(report) => tracing::info!(version = report.version, "category tree is consistent"),
        Err(err) => tracing::error!(error = %err, "could not validate the category tree"),
    }

    let repair_task = config
        .repair_interval()
        .map(|interval| tokio::spawn(api::run_scheduled_repair(Arc::clone(&state), interval)));

    let app = api::create_app(Arc::clone(&state), metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    let shutdown = state.shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await
        .expect("server error");

    state.shutdown.cancel();
    if let Some(task) = repair_task
        && let Err(err) = task.await
    {
        tracing::warn!(error = %err, "scheduled repair task failed");
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the store and serve
    match config.database_url.clone() {
        Some(url) => {
            let store = PostgresCategoryStore::connect(&url)
                .await
                .expect("failed to connect to the category database");
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            let catalog = PostgresProductCatalog::new(store.pool().clone());
            tracing::info!("using PostgreSQL category store and product catalog");
            serve(store, catalog, config, metrics_handle).await;
        }
        None => {
            tracing::warn!(
                "DATABASE_URL not set, using in-memory category store with an empty product catalog"
            );
            serve(
                InMemoryCategoryStore::new(),
                InMemoryProductCatalog::new(),
                config,
                metrics_handle,
            )
            .await;
        }
    }

    tracing::info!("server shut down gracefully");
}
