//! Tree validation and repair.

use std::sync::Arc;

use aggregates::ProductCatalog;
use axum::Json;
use axum::extract::State;
use category_store::CategoryStore;
use hierarchy::{RepairReport, ValidationReport};

use crate::error::ApiError;
use crate::routes::categories::AppState;

/// GET /categories/validate: read-only consistency scan.
#[tracing::instrument(skip(state))]
pub async fn validate<S: CategoryStore + 'static, P: ProductCatalog + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
) -> Result<Json<ValidationReport>, ApiError> {
    Ok(Json(state.service.validate_tree().await?))
}

/// POST /categories/repair: scan and fix the tree. Always answers with a
/// report; problems that could not be fixed are listed in it.
#[tracing::instrument(skip(state))]
pub async fn repair<S: CategoryStore + 'static, P: ProductCatalog + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
) -> Json<RepairReport> {
    Json(state.service.validate_and_repair(&state.shutdown).await)
}
