//! Slug lookup, SEO metadata and slug tooling endpoints.

use std::sync::Arc;

use aggregates::ProductCatalog;
use axum::Json;
use axum::extract::{Path, State};
use category_store::{Category, CategoryStore, SeoMetadata, SlugHistoryEntry};
use common::CategoryId;
use hierarchy::{SlugResolution, SlugValidation, UpdateSeo};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::routes::categories::{AppState, parse_category_id};

// -- Request types --

#[derive(Deserialize)]
pub struct SeoRequest {
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub seo: SeoMetadata,
}

#[derive(Deserialize)]
pub struct GenerateSlugRequest {
    pub text: String,
    #[serde(default)]
    pub exclude_id: Option<CategoryId>,
}

#[derive(Deserialize)]
pub struct ValidateSlugRequest {
    pub slug: String,
    #[serde(default)]
    pub exclude_id: Option<CategoryId>,
}

// -- Response types --

#[derive(Serialize)]
pub struct SeoResponse {
    pub id: CategoryId,
    pub slug: String,
    pub seo: SeoMetadata,
}

impl From<Category> for SeoResponse {
    fn from(category: Category) -> Self {
        Self {
            id: category.id,
            slug: category.slug,
            seo: category.seo,
        }
    }
}

#[derive(Serialize)]
pub struct GeneratedSlugResponse {
    pub slug: String,
}

// -- Handlers --

/// GET /categories/by-slug/{slug}: resolves current and historical slugs.
#[tracing::instrument(skip(state))]
pub async fn get_by_slug<S: CategoryStore + 'static, P: ProductCatalog + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
    Path(slug): Path<String>,
) -> Result<Json<SlugResolution>, ApiError> {
    Ok(Json(state.service.get_by_slug(&slug).await?))
}

/// GET /categories/{id}/seo
#[tracing::instrument(skip(state))]
pub async fn get_seo<S: CategoryStore + 'static, P: ProductCatalog + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
    Path(id): Path<String>,
) -> Result<Json<SeoResponse>, ApiError> {
    let id = parse_category_id(&id)?;
    Ok(Json(state.service.get_category(id).await?.into()))
}

/// PUT /categories/{id}/seo: replace SEO metadata, optionally renaming the
/// slug.
#[tracing::instrument(skip(state, req))]
pub async fn update_seo<S: CategoryStore + 'static, P: ProductCatalog + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
    Path(id): Path<String>,
    Json(req): Json<SeoRequest>,
) -> Result<Json<SeoResponse>, ApiError> {
    let id = parse_category_id(&id)?;
    let category = state
        .service
        .update_seo(UpdateSeo {
            id,
            slug: req.slug,
            seo: req.seo,
        })
        .await?;
    Ok(Json(category.into()))
}

/// GET /categories/{id}/slug-history
#[tracing::instrument(skip(state))]
pub async fn history<S: CategoryStore + 'static, P: ProductCatalog + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<SlugHistoryEntry>>, ApiError> {
    let id = parse_category_id(&id)?;
    Ok(Json(state.service.slug_history(id).await?))
}

/// POST /slugs/generate
#[tracing::instrument(skip(state, req))]
pub async fn generate<S: CategoryStore + 'static, P: ProductCatalog + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
    Json(req): Json<GenerateSlugRequest>,
) -> Result<Json<GeneratedSlugResponse>, ApiError> {
    let slug = state
        .service
        .generate_slug(&req.text, req.exclude_id)
        .await?;
    Ok(Json(GeneratedSlugResponse { slug }))
}

/// POST /slugs/validate
#[tracing::instrument(skip(state, req))]
pub async fn validate<S: CategoryStore + 'static, P: ProductCatalog + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
    Json(req): Json<ValidateSlugRequest>,
) -> Result<Json<SlugValidation>, ApiError> {
    Ok(Json(
        state
            .service
            .validate_slug(&req.slug, req.exclude_id)
            .await?,
    ))
}
