//! Category engine error types.

use category_store::StoreError;
use common::CategoryId;
use serde::Serialize;
use thiserror::Error;

/// Broad classification of a [`CategoryError`], used by adapters to pick a
/// response status and by bulk results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidArgument,
    Cancelled,
    Internal,
}

/// Errors that can occur during category operations.
#[derive(Debug, Error)]
pub enum CategoryError {
    /// The category does not exist.
    #[error("Category not found: {0}")]
    NotFound(CategoryId),

    /// The requested parent does not exist.
    #[error("Parent category not found: {0}")]
    ParentNotFound(CategoryId),

    /// No category uses or used the slug.
    #[error("No category with slug '{0}'")]
    SlugNotFound(String),

    /// Another category already owns the slug, now or through its history.
    #[error("Slug '{slug}' is already used by category {owner}")]
    SlugTaken {
        slug: String,
        owner: CategoryId,
        suggestions: Vec<String>,
    },

    /// The move would make a category its own ancestor.
    #[error("Moving category {id} under {new_parent} would create a cycle")]
    Cycle {
        id: CategoryId,
        new_parent: CategoryId,
    },

    /// Deleting the category would orphan its children.
    #[error("Category {id} still has {children} child categories")]
    HasChildren { id: CategoryId, children: usize },

    /// The tree changed underneath the operation.
    #[error("Category tree was modified concurrently")]
    ConcurrentModification,

    /// A category was asked to become its own parent.
    #[error("Category {0} cannot be its own parent")]
    SelfParent(CategoryId),

    /// Reorder items span more than one sibling group.
    #[error("Categories {first} and {other} do not share a parent")]
    MixedParents {
        first: CategoryId,
        other: CategoryId,
    },

    /// A request field failed validation.
    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// A bulk or reorder payload is malformed as a whole.
    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    /// The item was not processed because the operation was cancelled.
    #[error("Operation cancelled before this item was processed")]
    Cancelled,

    /// The store failed.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl CategoryError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        CategoryError::InvalidField {
            field,
            reason: reason.into(),
        }
    }

    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CategoryError::NotFound(_)
            | CategoryError::ParentNotFound(_)
            | CategoryError::SlugNotFound(_) => ErrorKind::NotFound,
            CategoryError::SlugTaken { .. }
            | CategoryError::Cycle { .. }
            | CategoryError::HasChildren { .. }
            | CategoryError::ConcurrentModification => ErrorKind::Conflict,
            CategoryError::SelfParent(_)
            | CategoryError::MixedParents { .. }
            | CategoryError::InvalidField { .. }
            | CategoryError::InvalidBatch(_) => ErrorKind::InvalidArgument,
            CategoryError::Cancelled => ErrorKind::Cancelled,
            CategoryError::Store(_) => ErrorKind::Internal,
        }
    }
}

impl From<StoreError> for CategoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConcurrencyConflict { .. } => CategoryError::ConcurrentModification,
            other => CategoryError::Store(other),
        }
    }
}

/// Result type for category operations.
pub type Result<T> = std::result::Result<T, CategoryError>;
