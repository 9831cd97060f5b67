//! Health check endpoint.

use std::sync::Arc;

use aggregates::ProductCatalog;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use category_store::CategoryStore;
use serde::Serialize;

use crate::routes::categories::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tree_version: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<usize>,
}

/// GET /health: reports whether the category store can serve a snapshot.
pub async fn check<S: CategoryStore + 'static, P: ProductCatalog + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
) -> (StatusCode, Json<HealthResponse>) {
    match state.service.snapshot().await {
        Ok(snapshot) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                tree_version: Some(snapshot.version()),
                categories: Some(snapshot.len()),
            }),
        ),
        Err(err) => {
            tracing::warn!(error = %err, "health check could not read the category tree");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable",
                    tree_version: None,
                    categories: None,
                }),
            )
        }
    }
}
