use std::sync::Arc;

use async_trait::async_trait;

use crate::{Category, CategoryId, ChangeSet, Result, SlugHistoryEntry, StoreError, TreeSnapshot};

/// Core trait for category store implementations.
///
/// A store persists category records and slug history and hands out
/// immutable snapshots of the last committed state. All implementations must
/// be thread-safe (Send + Sync).
#[async_trait]
pub trait CategoryStore: Send + Sync {
    /// Returns the last committed snapshot.
    ///
    /// Readers keep the returned `Arc` for as long as they need a consistent
    /// view; later commits never mutate it.
    async fn snapshot(&self) -> Result<Arc<TreeSnapshot>>;

    /// Applies a change set atomically.
    ///
    /// If `changes.expected_version` is set, the commit fails with
    /// `ConcurrencyConflict` when the tree has moved on. Returns the new tree
    /// version.
    async fn commit(&self, changes: ChangeSet) -> Result<u64>;
}

/// Extension trait providing convenience reads on top of snapshots.
#[async_trait]
pub trait CategoryStoreExt: CategoryStore {
    /// Loads a single category.
    async fn get(&self, id: CategoryId) -> Result<Option<Category>> {
        Ok(self.snapshot().await?.get(id).cloned())
    }

    /// Returns the current tree version.
    async fn current_version(&self) -> Result<u64> {
        Ok(self.snapshot().await?.version())
    }

    /// Returns the slug history of one category, oldest first.
    async fn slug_history(&self, id: CategoryId) -> Result<Vec<SlugHistoryEntry>> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot.history_for(id).into_iter().cloned().collect())
    }
}

// Blanket implementation for all CategoryStore implementations
impl<T: CategoryStore + ?Sized> CategoryStoreExt for T {}

/// Checks a change set against the snapshot it targets.
///
/// Shared by every backend so they reject exactly the same inputs.
pub(crate) fn check_commit(base: &TreeSnapshot, changes: &ChangeSet) -> Result<()> {
    if let Some(expected) = changes.expected_version
        && expected != base.version()
    {
        return Err(StoreError::ConcurrencyConflict {
            expected,
            actual: base.version(),
        });
    }
    changes.validate(base).map_err(StoreError::InvalidChangeSet)
}
