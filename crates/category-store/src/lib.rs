//! Storage layer for the category tree.
//!
//! The store is deliberately dumb about tree semantics: it persists whatever
//! records it is handed, atomically, and serves immutable snapshots with
//! prebuilt child and slug indexes. Keeping the invariants is the job of the
//! `hierarchy` crate.

pub mod changeset;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod snapshot;
pub mod store;

pub use changeset::ChangeSet;
pub use common::CategoryId;
pub use error::{Result, StoreError};
pub use memory::InMemoryCategoryStore;
pub use postgres::PostgresCategoryStore;
pub use record::{Category, CategoryBuilder, SeoMetadata, SlugHistoryEntry};
pub use snapshot::TreeSnapshot;
pub use store::{CategoryStore, CategoryStoreExt};
