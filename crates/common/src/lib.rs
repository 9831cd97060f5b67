//! Shared identifier types used across the category workspace.

mod types;

pub use types::CategoryId;
