//! Aggregator error types.

use common::CategoryId;
use hierarchy::CategoryError;
use thiserror::Error;

/// Errors that can occur while computing aggregates.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// The category does not exist.
    #[error("Category not found: {0}")]
    NotFound(CategoryId),

    /// The product catalog failed.
    #[error("Product catalog error: {0}")]
    Catalog(String),

    /// Reading the tree failed.
    #[error("Category error: {0}")]
    Category(#[from] CategoryError),
}

/// Result type for aggregate operations.
pub type Result<T> = std::result::Result<T, AggregateError>;
