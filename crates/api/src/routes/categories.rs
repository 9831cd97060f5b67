//! Category CRUD, tree reads, moves and reordering.

use std::sync::Arc;

use aggregates::{CategoryAggregator, ProductCatalog};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use category_store::{Category, CategoryStore};
use common::CategoryId;
use hierarchy::{
    CancellationToken, CategoryPatch, CategoryService, CategoryTreeNode, CreateCategory,
    MoveCategory, ReorderCategories, UpdateCategory,
};
use serde::Deserialize;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: CategoryStore, P: ProductCatalog> {
    pub service: Arc<CategoryService<S>>,
    pub aggregator: CategoryAggregator<S, P>,
    /// Cancelled on shutdown; stops bulk calls and scheduled repairs between
    /// chunks.
    pub shutdown: CancellationToken,
}

// -- Request types --

#[derive(Deserialize)]
pub struct MoveRequest {
    #[serde(default)]
    pub new_parent_id: Option<CategoryId>,
}

/// Parses a category id from a path segment.
pub fn parse_category_id(raw: &str) -> Result<CategoryId, ApiError> {
    CategoryId::parse_str(raw)
        .map_err(|e| ApiError::BadRequest(format!("Invalid category id '{raw}': {e}")))
}

// -- Handlers --

/// POST /categories: create a category at the end of its sibling group.
#[tracing::instrument(skip(state, req), fields(name = %req.name))]
pub async fn create<S: CategoryStore + 'static, P: ProductCatalog + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
    Json(req): Json<CreateCategory>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let category = state.service.create_category(req).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// GET /categories/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: CategoryStore + 'static, P: ProductCatalog + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
    Path(id): Path<String>,
) -> Result<Json<Category>, ApiError> {
    let id = parse_category_id(&id)?;
    Ok(Json(state.service.get_category(id).await?))
}

/// PATCH /categories/{id}: update name, slug, description, activity or SEO.
#[tracing::instrument(skip(state, patch))]
pub async fn update<S: CategoryStore + 'static, P: ProductCatalog + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
    Path(id): Path<String>,
    Json(patch): Json<CategoryPatch>,
) -> Result<Json<Category>, ApiError> {
    let id = parse_category_id(&id)?;
    let category = state
        .service
        .update_category(UpdateCategory { id, patch })
        .await?;
    Ok(Json(category))
}

/// DELETE /categories/{id}: delete a leaf category.
#[tracing::instrument(skip(state))]
pub async fn delete<S: CategoryStore + 'static, P: ProductCatalog + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
    Path(id): Path<String>,
) -> Result<Json<Category>, ApiError> {
    let id = parse_category_id(&id)?;
    Ok(Json(state.service.delete_category(id).await?))
}

/// GET /categories: root categories in display order.
#[tracing::instrument(skip(state))]
pub async fn roots<S: CategoryStore + 'static, P: ProductCatalog + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(state.service.get_roots().await?))
}

/// GET /categories/tree: the whole forest, nested.
#[tracing::instrument(skip(state))]
pub async fn tree<S: CategoryStore + 'static, P: ProductCatalog + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
) -> Result<Json<Vec<CategoryTreeNode>>, ApiError> {
    Ok(Json(state.service.get_tree().await?))
}

/// GET /categories/{id}/children
#[tracing::instrument(skip(state))]
pub async fn children<S: CategoryStore + 'static, P: ProductCatalog + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Category>>, ApiError> {
    let id = parse_category_id(&id)?;
    Ok(Json(state.service.get_children(id).await?))
}

/// GET /categories/{id}/path: breadcrumb from the root down to the category.
#[tracing::instrument(skip(state))]
pub async fn path<S: CategoryStore + 'static, P: ProductCatalog + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Category>>, ApiError> {
    let id = parse_category_id(&id)?;
    Ok(Json(state.service.get_path(id).await?))
}

/// GET /categories/{id}/subtree: the category and all descendants.
#[tracing::instrument(skip(state))]
pub async fn subtree<S: CategoryStore + 'static, P: ProductCatalog + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Category>>, ApiError> {
    let id = parse_category_id(&id)?;
    Ok(Json(state.service.get_subtree(id).await?))
}

/// POST /categories/{id}/move: reparent a category with its subtree.
#[tracing::instrument(skip(state, req))]
pub async fn move_category<S: CategoryStore + 'static, P: ProductCatalog + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
    Path(id): Path<String>,
    Json(req): Json<MoveRequest>,
) -> Result<Json<Category>, ApiError> {
    let id = parse_category_id(&id)?;
    let category = state
        .service
        .move_category(MoveCategory {
            id,
            new_parent_id: req.new_parent_id,
        })
        .await?;
    Ok(Json(category))
}

/// POST /categories/reorder: reposition siblings. Returns the whole group in
/// its new order.
#[tracing::instrument(skip(state, req), fields(items = req.items.len()))]
pub async fn reorder<S: CategoryStore + 'static, P: ProductCatalog + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
    Json(req): Json<ReorderCategories>,
) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(state.service.reorder_categories(req).await?))
}
