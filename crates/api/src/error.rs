//! API error types with HTTP response mapping.

use aggregates::AggregateError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hierarchy::{CategoryError, ErrorKind};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Category engine error.
    Category(CategoryError),
    /// Aggregate computation error.
    Aggregate(AggregateError),
    /// Internal server error.
    Internal(String),
}

/// Status code for an engine error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, error_body(msg)),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, error_body(msg)),
            ApiError::Category(err) => category_error_to_response(err),
            ApiError::Aggregate(err) => aggregate_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, error_body(msg))
            }
        };

        (status, axum::Json(body)).into_response()
    }
}

fn error_body(message: String) -> serde_json::Value {
    serde_json::json!({ "error": message })
}

/// JSON body for an engine error. Slug conflicts carry their suggestions.
pub fn category_error_body(err: &CategoryError) -> serde_json::Value {
    match err {
        CategoryError::SlugTaken { suggestions, .. } => serde_json::json!({
            "error": err.to_string(),
            "kind": err.kind(),
            "suggestions": suggestions,
        }),
        _ => serde_json::json!({ "error": err.to_string(), "kind": err.kind() }),
    }
}

fn category_error_to_response(err: CategoryError) -> (StatusCode, serde_json::Value) {
    let status = status_for(err.kind());
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %err, "category operation failed");
    }
    (status, category_error_body(&err))
}

fn aggregate_error_to_response(err: AggregateError) -> (StatusCode, serde_json::Value) {
    match err {
        AggregateError::Category(inner) => category_error_to_response(inner),
        AggregateError::NotFound(_) => (StatusCode::NOT_FOUND, error_body(err.to_string())),
        AggregateError::Catalog(_) => {
            tracing::warn!(error = %err, "product catalog failed");
            (StatusCode::BAD_GATEWAY, error_body(err.to_string()))
        }
    }
}

impl From<CategoryError> for ApiError {
    fn from(err: CategoryError) -> Self {
        ApiError::Category(err)
    }
}

impl From<AggregateError> for ApiError {
    fn from(err: AggregateError) -> Self {
        ApiError::Aggregate(err)
    }
}
