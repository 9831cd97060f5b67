//! Tree-wide statistics.

use std::collections::BTreeMap;

use category_store::TreeSnapshot;
use serde::Serialize;

/// Shape of the whole tree at one version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeStats {
    /// Tree version the numbers were computed at.
    pub version: u64,
    pub total_nodes: usize,
    pub active_nodes: usize,
    pub root_count: usize,
    pub leaf_count: usize,
    pub internal_count: usize,
    pub max_depth: u32,
    /// Number of categories at each stored depth.
    pub depth_histogram: BTreeMap<u32, usize>,
    /// Mean child count over categories that have children.
    pub average_branching_factor: f64,
}

impl TreeStats {
    /// Computes statistics with one pass over the snapshot.
    pub fn compute(snapshot: &TreeSnapshot) -> Self {
        let mut stats = TreeStats {
            version: snapshot.version(),
            total_nodes: snapshot.len(),
            active_nodes: 0,
            root_count: snapshot.roots().len(),
            leaf_count: 0,
            internal_count: 0,
            max_depth: 0,
            depth_histogram: BTreeMap::new(),
            average_branching_factor: 0.0,
        };

        let mut child_total = 0usize;
        for category in snapshot.iter() {
            if category.is_active {
                stats.active_nodes += 1;
            }
            *stats.depth_histogram.entry(category.depth).or_default() += 1;
            stats.max_depth = stats.max_depth.max(category.depth);

            let children = snapshot.child_ids(Some(category.id)).len();
            if children == 0 {
                stats.leaf_count += 1;
            } else {
                stats.internal_count += 1;
                child_total += children;
            }
        }

        if stats.internal_count > 0 {
            stats.average_branching_factor = child_total as f64 / stats.internal_count as f64;
        }
        stats
    }
}
