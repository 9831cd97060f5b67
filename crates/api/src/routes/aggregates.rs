//! Product counts, tree statistics and the product reassignment signal.

use std::sync::Arc;

use aggregates::{ProductCatalog, ProductCount, TreeStats};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use category_store::CategoryStore;
use common::CategoryId;
use serde::Deserialize;

use crate::error::ApiError;
use crate::routes::categories::{AppState, parse_category_id};

fn include_descendants_default() -> bool {
    true
}

#[derive(Deserialize)]
pub struct ProductCountParams {
    #[serde(default = "include_descendants_default")]
    pub include_descendants: bool,
}

#[derive(Deserialize)]
pub struct ReassignedRequest {
    pub category_ids: Vec<CategoryId>,
}

/// GET /categories/{id}/product-count?include_descendants=
#[tracing::instrument(skip(state, params))]
pub async fn product_count<S: CategoryStore + 'static, P: ProductCatalog + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
    Path(id): Path<String>,
    Query(params): Query<ProductCountParams>,
) -> Result<Json<ProductCount>, ApiError> {
    let id = parse_category_id(&id)?;
    let count = state
        .aggregator
        .product_count(id, params.include_descendants)
        .await?;
    Ok(Json(count))
}

/// GET /categories/stats
#[tracing::instrument(skip(state))]
pub async fn stats<S: CategoryStore + 'static, P: ProductCatalog + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
) -> Result<Json<TreeStats>, ApiError> {
    Ok(Json(state.aggregator.tree_stats().await?))
}

/// POST /products/reassigned: the product catalog signals that products
/// moved between categories.
#[tracing::instrument(skip(state, req), fields(categories = req.category_ids.len()))]
pub async fn reassigned<S: CategoryStore + 'static, P: ProductCatalog + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
    Json(req): Json<ReassignedRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .aggregator
        .products_reassigned(&req.category_ids)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
