//! Read-side shapes returned by the service.

use std::collections::HashSet;

use category_store::{Category, TreeSnapshot};
use common::CategoryId;
use serde::Serialize;

/// A category with its ordered children, recursively.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryTreeNode {
    #[serde(flatten)]
    pub category: Category,
    pub children: Vec<CategoryTreeNode>,
}

impl CategoryTreeNode {
    /// Builds the nested forest of all roots.
    pub fn forest(snapshot: &TreeSnapshot) -> Vec<CategoryTreeNode> {
        let mut visited = HashSet::new();
        snapshot
            .child_ids(None)
            .iter()
            .filter_map(|id| Self::build(snapshot, *id, &mut visited))
            .collect()
    }

    /// Builds the nested tree below `id`.
    pub fn subtree(snapshot: &TreeSnapshot, id: CategoryId) -> Option<CategoryTreeNode> {
        Self::build(snapshot, id, &mut HashSet::new())
    }

    fn build(
        snapshot: &TreeSnapshot,
        id: CategoryId,
        visited: &mut HashSet<CategoryId>,
    ) -> Option<CategoryTreeNode> {
        if !visited.insert(id) {
            return None;
        }
        let category = snapshot.get(id)?.clone();
        let children = snapshot
            .child_ids(Some(id))
            .iter()
            .filter_map(|child| Self::build(snapshot, *child, visited))
            .collect();
        Some(CategoryTreeNode { category, children })
    }

    /// Number of nodes in this tree.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(CategoryTreeNode::size).sum::<usize>()
    }
}

/// Result of a slug lookup.
#[derive(Debug, Clone, Serialize)]
pub struct SlugResolution {
    pub category: Category,

    /// The historical slug the lookup went through, when it was a redirect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirected_from: Option<String>,
}

impl SlugResolution {
    pub fn is_redirect(&self) -> bool {
        self.redirected_from.is_some()
    }
}
