//! Commit notifications for caches built on top of the tree.

use std::collections::BTreeSet;

use common::CategoryId;

/// What changed in a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeChange {
    /// A mutation committed. `affected` holds every written or deleted
    /// category together with its ancestors before and after the change.
    Committed {
        version: u64,
        affected: BTreeSet<CategoryId>,
    },

    /// Validate-and-repair ran; anything derived from the tree is stale.
    Rebuilt { version: u64 },
}

impl TreeChange {
    pub fn version(&self) -> u64 {
        match self {
            TreeChange::Committed { version, .. } | TreeChange::Rebuilt { version } => *version,
        }
    }
}

/// Receives a notification after every successful commit.
///
/// Called on the committing task while the write scope is still held, so
/// implementations must be quick and must not call back into the service.
pub trait TreeObserver: Send + Sync {
    fn on_tree_change(&self, change: &TreeChange);
}
