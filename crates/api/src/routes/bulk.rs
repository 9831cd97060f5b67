//! Bulk create, update, delete and SEO endpoints.
//!
//! Every bulk call answers 200 with one result per item, in request order.
//! Only a malformed payload as a whole is rejected with an error status.

use std::sync::Arc;

use aggregates::ProductCatalog;
use axum::Json;
use axum::extract::State;
use category_store::{Category, CategoryStore};
use common::CategoryId;
use hierarchy::{BulkReport, CreateCategory, UpdateCategory, UpdateSeo};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, category_error_body, status_for};
use crate::routes::categories::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct BulkCreateRequest {
    pub items: Vec<CreateCategory>,
}

#[derive(Deserialize)]
pub struct BulkUpdateRequest {
    pub items: Vec<UpdateCategory>,
}

#[derive(Deserialize)]
pub struct BulkDeleteRequest {
    pub ids: Vec<CategoryId>,
}

#[derive(Deserialize)]
pub struct BulkSeoRequest {
    pub items: Vec<UpdateSeo>,
}

// -- Response types --

#[derive(Serialize)]
pub struct BulkItemResponse {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<CategoryId>,
    /// HTTP status the item would have had as a single request.
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
}

#[derive(Serialize)]
pub struct BulkResponse {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<BulkItemResponse>,
}

impl From<BulkReport<Category>> for BulkResponse {
    fn from(report: BulkReport<Category>) -> Self {
        let total = report.len();
        let succeeded = report.succeeded();
        let failed = report.failed();
        let results = report
            .results
            .into_iter()
            .map(|item| match item.outcome {
                Ok(category) => BulkItemResponse {
                    index: item.index,
                    id: Some(category.id),
                    status: 200,
                    category: Some(category),
                    error: None,
                },
                Err(err) => BulkItemResponse {
                    index: item.index,
                    id: item.id,
                    status: status_for(err.kind()).as_u16(),
                    category: None,
                    error: Some(category_error_body(&err)),
                },
            })
            .collect();

        BulkResponse {
            total,
            succeeded,
            failed,
            results,
        }
    }
}

// -- Handlers --

/// POST /categories/bulk/create
#[tracing::instrument(skip(state, req), fields(items = req.items.len()))]
pub async fn create<S: CategoryStore + 'static, P: ProductCatalog + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
    Json(req): Json<BulkCreateRequest>,
) -> Result<Json<BulkResponse>, ApiError> {
    let report = state
        .service
        .bulk_create(req.items, &state.shutdown)
        .await?;
    Ok(Json(report.into()))
}

/// POST /categories/bulk/update
#[tracing::instrument(skip(state, req), fields(items = req.items.len()))]
pub async fn update<S: CategoryStore + 'static, P: ProductCatalog + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
    Json(req): Json<BulkUpdateRequest>,
) -> Result<Json<BulkResponse>, ApiError> {
    let report = state
        .service
        .bulk_update(req.items, &state.shutdown)
        .await?;
    Ok(Json(report.into()))
}

/// POST /categories/bulk/delete
#[tracing::instrument(skip(state, req), fields(items = req.ids.len()))]
pub async fn delete<S: CategoryStore + 'static, P: ProductCatalog + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
    Json(req): Json<BulkDeleteRequest>,
) -> Result<Json<BulkResponse>, ApiError> {
    let report = state.service.bulk_delete(req.ids, &state.shutdown).await?;
    Ok(Json(report.into()))
}

/// POST /categories/bulk/seo
#[tracing::instrument(skip(state, req), fields(items = req.items.len()))]
pub async fn update_seo<S: CategoryStore + 'static, P: ProductCatalog + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
    Json(req): Json<BulkSeoRequest>,
) -> Result<Json<BulkResponse>, ApiError> {
    let report = state
        .service
        .bulk_update_seo(req.items, &state.shutdown)
        .await?;
    Ok(Json(report.into()))
}
