use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    Category, ChangeSet, Result, SlugHistoryEntry, StoreError, TreeSnapshot,
    store::{CategoryStore, check_commit},
};

/// In-memory category store.
///
/// Holds the committed state as a single `Arc<TreeSnapshot>`. A commit builds
/// the next snapshot off to the side and swaps it in, so readers see either
/// the old tree or the new one, never a mix.
#[derive(Clone, Default)]
pub struct InMemoryCategoryStore {
    current: Arc<RwLock<Arc<TreeSnapshot>>>,
    fail_on_commit: Arc<AtomicBool>,
}

impl InMemoryCategoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with raw records, without any checks.
    pub fn with_records(categories: Vec<Category>, history: Vec<SlugHistoryEntry>) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(TreeSnapshot::new(
                0, categories, history,
            )))),
            fail_on_commit: Arc::default(),
        }
    }

    /// Returns the number of stored categories.
    pub async fn category_count(&self) -> usize {
        self.current.read().await.len()
    }

    /// Makes every subsequent commit fail until reset.
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.fail_on_commit.store(fail, Ordering::SeqCst);
    }

    /// Clears all records and history.
    pub async fn clear(&self) {
        *self.current.write().await = Arc::new(TreeSnapshot::default());
    }
}

#[async_trait]
impl CategoryStore for InMemoryCategoryStore {
    async fn snapshot(&self) -> Result<Arc<TreeSnapshot>> {
        Ok(Arc::clone(&*self.current.read().await))
    }

    async fn commit(&self, changes: ChangeSet) -> Result<u64> {
        if self.fail_on_commit.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "in-memory store configured to fail".to_string(),
            ));
        }

        let mut current = self.current.write().await;
        check_commit(&current, &changes)?;

        let next = current.apply(&changes);
        let version = next.version();
        *current = Arc::new(next);

        tracing::debug!(
            version,
            upserts = changes.upserts.len(),
            deletes = changes.deletes.len(),
            history = changes.history.len(),
            "committed change set"
        );
        metrics::counter!("category_store_commits_total", "backend" => "memory").increment(1);

        Ok(version)
    }
}
