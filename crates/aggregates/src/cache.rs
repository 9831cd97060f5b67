//! Explicit aggregate cache with commit-driven invalidation.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

use common::CategoryId;
use hierarchy::{TreeChange, TreeObserver};

use crate::stats::TreeStats;

#[derive(Debug, Default)]
struct CacheState {
    /// Keyed by (category, include_descendants).
    counts: HashMap<(CategoryId, bool), i64>,
    stats: Option<TreeStats>,
    /// Bumped on every invalidation. A value computed under an older
    /// generation is dropped instead of stored.
    generation: u64,
}

/// Cache for product counts and tree statistics.
///
/// Registered as a [`TreeObserver`], so every tree commit drops the entries
/// it affects before the committing call returns.
#[derive(Debug, Default)]
pub struct AggregateCache {
    state: RwLock<CacheState>,
}

impl AggregateCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current invalidation generation. Read it before computing a value
    /// that will be stored with [`AggregateCache::put_count`].
    pub fn generation(&self) -> u64 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .generation
    }

    pub fn count(&self, id: CategoryId, include_descendants: bool) -> Option<i64> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .counts
            .get(&(id, include_descendants))
            .copied()
    }

    /// Stores a count computed at `generation`. Returns false when an
    /// invalidation happened in between and the value was discarded.
    pub fn put_count(
        &self,
        id: CategoryId,
        include_descendants: bool,
        count: i64,
        generation: u64,
    ) -> bool {
        let mut state = self.write();
        if state.generation != generation {
            return false;
        }
        state.counts.insert((id, include_descendants), count);
        true
    }

    /// Cached statistics, if they were computed at `version`.
    pub fn stats(&self, version: u64) -> Option<TreeStats> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .stats
            .as_ref()
            .filter(|stats| stats.version == version)
            .cloned()
    }

    pub fn put_stats(&self, stats: TreeStats) {
        let mut state = self.write();
        let newer = state
            .stats
            .as_ref()
            .is_none_or(|cached| cached.version <= stats.version);
        if newer {
            state.stats = Some(stats);
        }
    }

    /// Drops the counts of the given categories, with and without
    /// descendants.
    pub fn invalidate<I>(&self, ids: I)
    where
        I: IntoIterator<Item = CategoryId>,
    {
        let mut state = self.write();
        state.generation += 1;
        for id in ids {
            state.counts.remove(&(id, false));
            state.counts.remove(&(id, true));
        }
    }

    pub fn invalidate_all(&self) {
        let mut state = self.write();
        state.generation += 1;
        state.counts.clear();
        state.stats = None;
    }

    /// Number of cached counts.
    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .counts
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TreeObserver for AggregateCache {
    fn on_tree_change(&self, change: &TreeChange) {
        match change {
            TreeChange::Committed { version, affected } => {
                tracing::trace!(version, affected = affected.len(), "invalidating aggregates");
                let mut state = self.write();
                state.generation += 1;
                for id in affected {
                    state.counts.remove(&(*id, false));
                    state.counts.remove(&(*id, true));
                }
                state.stats = None;
            }
            TreeChange::Rebuilt { version } => {
                tracing::debug!(version, "tree rebuilt, dropping all aggregates");
                self.invalidate_all();
            }
        }
        metrics::counter!("category_aggregate_invalidations_total").increment(1);
    }
}
