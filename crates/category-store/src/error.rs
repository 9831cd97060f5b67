use thiserror::Error;

/// Errors that can occur when interacting with the category store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The change set was computed against an older tree version.
    #[error("Concurrent modification: expected tree version {expected}, found {actual}")]
    ConcurrencyConflict { expected: u64, actual: u64 },

    /// The change set is internally inconsistent and was not applied.
    #[error("Invalid change set: {0}")]
    InvalidChangeSet(String),

    /// The backend refused the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for category store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
