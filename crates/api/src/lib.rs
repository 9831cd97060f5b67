//! HTTP API server for the category hierarchy engine.
//!
//! Exposes category CRUD, tree reads, moves, reordering, bulk operations,
//! slug tooling, product counts and tree repair as REST endpoints, with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use aggregates::{CategoryAggregator, ProductCatalog};
use axum::Router;
use axum::routing::{get, post};
use category_store::CategoryStore;
use hierarchy::{CancellationToken, CategoryService, EngineConfig};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::categories::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: CategoryStore + 'static, P: ProductCatalog + 'static>(
    state: Arc<AppState<S, P>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    use routes::{aggregates, bulk, categories, health, maintenance, slugs};

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(health::check::<S, P>))
        .route(
            "/categories",
            post(categories::create::<S, P>).get(categories::roots::<S, P>),
        )
        .route("/categories/tree", get(categories::tree::<S, P>))
        .route("/categories/reorder", post(categories::reorder::<S, P>))
        .route("/categories/stats", get(aggregates::stats::<S, P>))
        .route("/categories/validate", get(maintenance::validate::<S, P>))
        .route("/categories/repair", post(maintenance::repair::<S, P>))
        .route("/categories/by-slug/{slug}", get(slugs::get_by_slug::<S, P>))
        .route("/categories/bulk/create", post(bulk::create::<S, P>))
        .route("/categories/bulk/update", post(bulk::update::<S, P>))
        .route("/categories/bulk/delete", post(bulk::delete::<S, P>))
        .route("/categories/bulk/seo", post(bulk::update_seo::<S, P>))
        .route(
            "/categories/{id}",
            get(categories::get::<S, P>)
                .patch(categories::update::<S, P>)
                .delete(categories::delete::<S, P>),
        )
        .route("/categories/{id}/children", get(categories::children::<S, P>))
        .route("/categories/{id}/path", get(categories::path::<S, P>))
        .route("/categories/{id}/subtree", get(categories::subtree::<S, P>))
        .route("/categories/{id}/move", post(categories::move_category::<S, P>))
        .route(
            "/categories/{id}/product-count",
            get(aggregates::product_count::<S, P>),
        )
        .route(
            "/categories/{id}/seo",
            get(slugs::get_seo::<S, P>).put(slugs::update_seo::<S, P>),
        )
        .route("/categories/{id}/slug-history", get(slugs::history::<S, P>))
        .route("/slugs/generate", post(slugs::generate::<S, P>))
        .route("/slugs/validate", post(slugs::validate::<S, P>))
        .route("/products/reassigned", post(aggregates::reassigned::<S, P>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state over a category store and the product
/// catalog that product counts are read from.
pub fn create_default_state<S: CategoryStore + 'static, P: ProductCatalog + 'static>(
    store: S,
    catalog: P,
    engine: EngineConfig,
) -> Arc<AppState<S, P>> {
    let service = Arc::new(CategoryService::with_config(store, engine));
    let aggregator = CategoryAggregator::new(service.clone(), catalog);

    Arc::new(AppState {
        service,
        aggregator,
        shutdown: CancellationToken::new(),
    })
}

/// Runs validate-and-repair every `interval` until the state's shutdown
/// token is cancelled.
pub async fn run_scheduled_repair<S: CategoryStore + 'static, P: ProductCatalog + 'static>(
    state: Arc<AppState<S, P>>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately; skip it so startup is not a repair.
    ticker.tick().await;

    loop {
        tokio::select! {
            () = state.shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let report = state.service.validate_and_repair(&state.shutdown).await;
                metrics::counter!("category_scheduled_repairs_total").increment(1);
                if report.is_clean() {
                    tracing::debug!(version = report.version, "scheduled repair found no issues");
                } else {
                    tracing::warn!(
                        found = report.found.total(),
                        fixed = report.fixed.total(),
                        unfixable = report.unfixable.len(),
                        "scheduled repair changed the tree"
                    );
                }
            }
        }
    }
    tracing::info!("scheduled repair stopped");
}
