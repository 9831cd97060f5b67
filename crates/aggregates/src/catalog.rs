//! Product catalog trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::CategoryId;

use crate::error::{AggregateError, Result};

/// Source of per-category product counts.
///
/// Counts are for products assigned directly to each category, not to its
/// descendants.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Returns the direct product count of each requested category.
    /// Categories without products may be omitted.
    async fn count_products(&self, category_ids: &[CategoryId]) -> Result<HashMap<CategoryId, i64>>;
}

#[derive(Debug, Default)]
struct InMemoryCatalogState {
    counts: HashMap<CategoryId, i64>,
    calls: usize,
    fail_on_count: bool,
}

/// In-memory product catalog, used when no database is configured and in
/// tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProductCatalog {
    state: Arc<RwLock<InMemoryCatalogState>>,
}

impl InMemoryProductCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryCatalogState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the direct product count of a category.
    pub fn set_count(&self, category_id: CategoryId, count: i64) {
        self.write().counts.insert(category_id, count);
    }

    /// Moves `count` products from one category to another.
    ///
    /// The catalog does not know about the tree; callers must signal the
    /// aggregator with both ids afterwards.
    pub fn reassign(&self, from: CategoryId, to: CategoryId, count: i64) {
        let mut state = self.write();
        *state.counts.entry(from).or_default() -= count;
        *state.counts.entry(to).or_default() += count;
    }

    /// Configures the catalog to fail every count request.
    pub fn set_fail_on_count(&self, fail: bool) {
        self.write().fail_on_count = fail;
    }

    /// Returns how many count requests have been served.
    pub fn call_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .calls
    }
}

#[async_trait]
impl ProductCatalog for InMemoryProductCatalog {
    async fn count_products(&self, category_ids: &[CategoryId]) -> Result<HashMap<CategoryId, i64>> {
        let mut state = self.write();
        state.calls += 1;

        if state.fail_on_count {
            return Err(AggregateError::Catalog(
                "product catalog unavailable".to_string(),
            ));
        }

        Ok(category_ids
            .iter()
            .filter_map(|id| state.counts.get(id).map(|count| (*id, *count)))
            .collect())
    }
}
