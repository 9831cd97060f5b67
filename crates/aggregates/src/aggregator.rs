//! Subtree product counts and tree statistics.

use std::collections::BTreeSet;
use std::sync::Arc;

use category_store::CategoryStore;
use common::CategoryId;
use hierarchy::CategoryService;
use serde::Serialize;

use crate::cache::AggregateCache;
use crate::catalog::ProductCatalog;
use crate::error::{AggregateError, Result};
use crate::stats::TreeStats;

/// Product count of one category, optionally including its descendants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductCount {
    pub category_id: CategoryId,
    pub include_descendants: bool,
    pub count: i64,
}

/// Computes derived numbers over the tree, backed by [`AggregateCache`].
///
/// The catalog is only called from here and never while the tree's write
/// scope is held, so a slow or failing catalog cannot stall tree writes.
pub struct CategoryAggregator<S: CategoryStore, P: ProductCatalog> {
    service: Arc<CategoryService<S>>,
    catalog: P,
    cache: Arc<AggregateCache>,
}

impl<S: CategoryStore, P: ProductCatalog> CategoryAggregator<S, P> {
    /// Creates an aggregator and registers its cache with the service.
    pub fn new(service: Arc<CategoryService<S>>, catalog: P) -> Self {
        let cache = Arc::new(AggregateCache::new());
        service.register_observer(cache.clone());
        Self {
            service,
            catalog,
            cache,
        }
    }

    pub fn cache(&self) -> &AggregateCache {
        &self.cache
    }

    pub fn catalog(&self) -> &P {
        &self.catalog
    }

    /// Counts products in a category, or in the category and all of its
    /// descendants.
    #[tracing::instrument(skip(self))]
    pub async fn product_count(
        &self,
        id: CategoryId,
        include_descendants: bool,
    ) -> Result<ProductCount> {
        let generation = self.cache.generation();
        let snapshot = self.service.snapshot().await?;
        if !snapshot.contains(id) {
            return Err(AggregateError::NotFound(id));
        }

        if let Some(count) = self.cache.count(id, include_descendants) {
            metrics::counter!("category_product_count_cache_hits_total").increment(1);
            return Ok(ProductCount {
                category_id: id,
                include_descendants,
                count,
            });
        }
        metrics::counter!("category_product_count_cache_misses_total").increment(1);

        let ids = if include_descendants {
            snapshot.subtree_ids(id)
        } else {
            vec![id]
        };
        let counts = self.catalog.count_products(&ids).await.inspect_err(|err| {
            tracing::warn!(category_id = %id, error = %err, "product catalog call failed");
        })?;
        let count: i64 = ids.iter().filter_map(|id| counts.get(id)).sum();

        if !self.cache.put_count(id, include_descendants, count, generation) {
            tracing::debug!(category_id = %id, "tree changed during count, not caching");
        }

        Ok(ProductCount {
            category_id: id,
            include_descendants,
            count,
        })
    }

    /// Statistics over the whole tree, cached until the next commit.
    #[tracing::instrument(skip(self))]
    pub async fn tree_stats(&self) -> Result<TreeStats> {
        let snapshot = self.service.snapshot().await?;
        if let Some(stats) = self.cache.stats(snapshot.version()) {
            return Ok(stats);
        }

        let stats = TreeStats::compute(&snapshot);
        self.cache.put_stats(stats.clone());
        Ok(stats)
    }

    /// Signals that products were reassigned between categories.
    ///
    /// Drops the cached counts of every signalled category and of all their
    /// ancestors. Unknown ids are ignored.
    pub async fn products_reassigned(&self, ids: &[CategoryId]) -> Result<()> {
        let snapshot = self.service.snapshot().await?;
        let mut stale = BTreeSet::new();
        for id in ids {
            stale.insert(*id);
            if let Some(category) = snapshot.get(*id) {
                stale.extend(category.path.iter().copied());
            }
        }

        tracing::debug!(signalled = ids.len(), invalidated = stale.len(), "products reassigned");
        self.cache.invalidate(stale);
        Ok(())
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}
