//! Working copy of the tree and path maintenance.
//!
//! A [`TreeDraft`] is cloned from a committed snapshot, mutated in memory and
//! turned into one [`ChangeSet`]. Every hierarchy change recomputes the
//! materialized path and depth of the affected subtree inside the same draft,
//! so a commit always carries consistent paths for every node it touches.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use category_store::{Category, ChangeSet, SlugHistoryEntry, TreeSnapshot};
use chrono::{DateTime, Utc};
use common::CategoryId;

use crate::slug::SlugLookup;

/// Mutable working copy of the category tree.
#[derive(Debug, Clone)]
pub struct TreeDraft {
    base_version: u64,
    now: DateTime<Utc>,
    nodes: HashMap<CategoryId, Category>,
    children: HashMap<Option<CategoryId>, Vec<CategoryId>>,
    active_slugs: HashMap<String, BTreeSet<CategoryId>>,
    retired_slugs: HashMap<String, CategoryId>,
    /// Stored paths as of the base snapshot, for invalidation.
    original_paths: HashMap<CategoryId, Vec<CategoryId>>,
    dirty: BTreeSet<CategoryId>,
    deleted: Vec<CategoryId>,
    history: Vec<SlugHistoryEntry>,
}

impl TreeDraft {
    /// Clones a committed snapshot into a draft.
    pub fn from_snapshot(snapshot: &TreeSnapshot) -> Self {
        let nodes: HashMap<CategoryId, Category> =
            snapshot.iter().map(|c| (c.id, c.clone())).collect();
        let children = snapshot
            .parent_keys()
            .map(|parent| (parent, snapshot.child_ids(parent).to_vec()))
            .collect();

        let mut active_slugs: HashMap<String, BTreeSet<CategoryId>> = HashMap::new();
        for category in nodes.values().filter(|c| c.is_active) {
            active_slugs
                .entry(category.slug.clone())
                .or_default()
                .insert(category.id);
        }

        let mut retired_slugs = HashMap::new();
        for entry in snapshot.history() {
            retired_slugs.insert(entry.old_slug.clone(), entry.category_id);
        }

        Self {
            base_version: snapshot.version(),
            now: Utc::now(),
            nodes,
            children,
            active_slugs,
            retired_slugs,
            original_paths: HashMap::new(),
            dirty: BTreeSet::new(),
            deleted: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Version of the snapshot this draft started from.
    pub fn base_version(&self) -> u64 {
        self.base_version
    }

    /// Timestamp stamped on every record this draft writes.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: CategoryId) -> Option<&Category> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: CategoryId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// All ids, sorted, for deterministic scans.
    pub fn ids(&self) -> Vec<CategoryId> {
        let mut ids: Vec<_> = self.nodes.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Every parent key with a non-empty sibling group, dangling ones included.
    pub fn parent_keys(&self) -> Vec<Option<CategoryId>> {
        let mut keys: Vec<_> = self
            .children
            .iter()
            .filter(|(_, group)| !group.is_empty())
            .map(|(parent, _)| *parent)
            .collect();
        keys.sort();
        keys
    }

    /// Sibling group under `parent`, ordered by (sort_order, created_at, id).
    pub fn siblings(&self, parent: Option<CategoryId>) -> Vec<CategoryId> {
        let mut group = self.children.get(&parent).cloned().unwrap_or_default();
        group.sort_by(|a, b| {
            let (a, b) = (&self.nodes[a], &self.nodes[b]);
            a.sort_order
                .cmp(&b.sort_order)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        group
    }

    pub fn child_count(&self, id: CategoryId) -> usize {
        self.children.get(&Some(id)).map_or(0, Vec::len)
    }

    /// Returns true if `candidate` is `root` or lies below it.
    ///
    /// Walks the ancestors of `candidate` toward the top of the tree. The walk
    /// is bounded by the node count so corrupted parent cycles terminate.
    pub fn is_within_subtree(&self, candidate: CategoryId, root: CategoryId) -> bool {
        let mut current = Some(candidate);
        let mut steps = 0;
        while let Some(id) = current {
            if id == root {
                return true;
            }
            steps += 1;
            if steps > self.nodes.len() {
                return false;
            }
            current = self.nodes.get(&id).and_then(|c| c.parent_id);
        }
        false
    }

    /// `id` and all of its descendants, breadth-first.
    pub fn subtree(&self, id: CategoryId) -> Vec<CategoryId> {
        let mut seen = HashSet::from([id]);
        let mut order = vec![id];
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for child in self.siblings(Some(current)) {
                if seen.insert(child) {
                    order.push(child);
                    queue.push_back(child);
                }
            }
        }
        order
    }

    /// Path and depth a new child of `parent` would get, given its id.
    pub fn placement(&self, parent: Option<CategoryId>, id: CategoryId) -> (Vec<CategoryId>, u32) {
        let mut path = parent
            .and_then(|p| self.nodes.get(&p))
            .map(|p| p.path.clone())
            .unwrap_or_default();
        path.push(id);
        let depth = (path.len() - 1) as u32;
        (path, depth)
    }

    /// Next free sort order at the end of a sibling group.
    pub fn next_sort_order(&self, parent: Option<CategoryId>) -> i32 {
        self.children
            .get(&parent)
            .into_iter()
            .flatten()
            .filter_map(|id| self.nodes.get(id))
            .map(|c| c.sort_order)
            .max()
            .map_or(0, |max| max + 1)
    }

    fn remember_original(&mut self, id: CategoryId) {
        if let Some(category) = self.nodes.get(&id) {
            self.original_paths
                .entry(id)
                .or_insert_with(|| category.path.clone());
        }
    }

    fn unindex_slug(&mut self, category: &Category) {
        if category.is_active
            && let Some(owners) = self.active_slugs.get_mut(&category.slug)
        {
            owners.remove(&category.id);
            if owners.is_empty() {
                self.active_slugs.remove(&category.slug);
            }
        }
    }

    fn index_slug(&mut self, category: &Category) {
        if category.is_active {
            self.active_slugs
                .entry(category.slug.clone())
                .or_default()
                .insert(category.id);
        }
    }

    /// Adds a new record as-is.
    pub fn insert(&mut self, category: Category) {
        self.children
            .entry(category.parent_id)
            .or_default()
            .push(category.id);
        self.index_slug(&category);
        self.dirty.insert(category.id);
        self.nodes.insert(category.id, category);
    }

    /// Applies `change` to a record and marks it for writing.
    ///
    /// Only leaf attributes may change here; use [`TreeDraft::set_parent`] for
    /// hierarchy changes. Returns false if the record does not exist.
    pub fn update(&mut self, id: CategoryId, change: impl FnOnce(&mut Category)) -> bool {
        let Some(before) = self.nodes.get(&id).cloned() else {
            return false;
        };
        self.remember_original(id);
        let mut after = before.clone();
        change(&mut after);
        after.parent_id = before.parent_id;
        if after == before {
            return true;
        }
        after.updated_at = self.now;
        self.unindex_slug(&before);
        self.index_slug(&after);
        self.nodes.insert(id, after);
        self.dirty.insert(id);
        true
    }

    /// Changes a slug, appending the rename to history. No-op if unchanged.
    pub fn rename_slug(&mut self, id: CategoryId, new_slug: &str) {
        let Some(old_slug) = self.nodes.get(&id).map(|c| c.slug.clone()) else {
            return;
        };
        if old_slug == new_slug {
            return;
        }
        self.update(id, |c| c.slug = new_slug.to_string());
        self.retired_slugs.insert(old_slug.clone(), id);
        self.history
            .push(SlugHistoryEntry::new(id, old_slug, new_slug));
    }

    /// Rewrites the parent pointer and nothing else.
    ///
    /// Paths, depths and sort orders are left for the caller to fix up,
    /// which lets repair detach nodes in bulk before recomputing.
    pub fn set_parent(&mut self, id: CategoryId, new_parent: Option<CategoryId>) {
        let Some(old_parent) = self.nodes.get(&id).map(|c| c.parent_id) else {
            return;
        };
        if old_parent == new_parent {
            return;
        }
        self.remember_original(id);
        if let Some(group) = self.children.get_mut(&old_parent) {
            group.retain(|child| *child != id);
        }
        self.children.entry(new_parent).or_default().push(id);
        if let Some(category) = self.nodes.get_mut(&id) {
            category.parent_id = new_parent;
            category.updated_at = self.now;
        }
        self.dirty.insert(id);
    }

    /// Sets the sort order of one record, marking it only if it changed.
    pub fn set_sort_order(&mut self, id: CategoryId, sort_order: i32) {
        if let Some(category) = self.nodes.get_mut(&id)
            && category.sort_order != sort_order
        {
            category.sort_order = sort_order;
            category.updated_at = self.now;
            self.dirty.insert(id);
        }
    }

    /// Renumbers `ordered` to `0..N-1` in the given order. Returns how many
    /// records changed.
    pub fn assign_order(&mut self, ordered: &[CategoryId]) -> usize {
        let mut changed = 0;
        for (position, id) in ordered.iter().enumerate() {
            let target = position as i32;
            if self.nodes.get(id).is_some_and(|c| c.sort_order != target) {
                self.set_sort_order(*id, target);
                changed += 1;
            }
        }
        changed
    }

    /// Closes gaps in the sibling group under `parent`, keeping its order.
    pub fn normalize_siblings(&mut self, parent: Option<CategoryId>) -> usize {
        let ordered = self.siblings(parent);
        self.assign_order(&ordered)
    }

    /// Recomputes path and depth for `id` and every descendant from the
    /// parent chain: each node's path becomes its parent's path plus its own
    /// id, which replaces the old ancestor prefix across the whole subtree.
    /// A node whose parent is missing is treated as a root.
    ///
    /// Returns the ids whose stored path or depth changed.
    pub fn rebase_subtree(&mut self, id: CategoryId) -> Vec<CategoryId> {
        let mut changed = Vec::new();
        for node in self.subtree(id) {
            let parent = self.nodes.get(&node).and_then(|c| c.parent_id);
            let (path, depth) = self.placement(parent.filter(|p| self.contains(*p)), node);
            let stale = self
                .nodes
                .get(&node)
                .is_some_and(|c| c.path != path || c.depth != depth);
            if stale {
                self.remember_original(node);
                if let Some(category) = self.nodes.get_mut(&node) {
                    category.path = path;
                    category.depth = depth;
                    category.updated_at = self.now;
                }
                self.dirty.insert(node);
                changed.push(node);
            }
        }
        changed
    }

    /// Removes a record. The caller must have dealt with its children.
    pub fn remove(&mut self, id: CategoryId) -> Option<Category> {
        let category = self.nodes.remove(&id)?;
        self.original_paths
            .entry(id)
            .or_insert_with(|| category.path.clone());
        if let Some(group) = self.children.get_mut(&category.parent_id) {
            group.retain(|child| *child != id);
        }
        self.unindex_slug(&category);
        self.retired_slugs.retain(|_, owner| *owner != id);
        self.dirty.remove(&id);
        self.deleted.push(id);
        Some(category)
    }

    /// Returns true if nothing has been changed.
    pub fn is_unchanged(&self) -> bool {
        self.dirty.is_empty() && self.deleted.is_empty() && self.history.is_empty()
    }

    /// Ids whose subtree contents may differ after commit: every written or
    /// deleted record plus all of its ancestors before and after the change.
    pub fn affected_ids(&self) -> BTreeSet<CategoryId> {
        let mut affected = BTreeSet::new();
        for id in self.dirty.iter().chain(self.deleted.iter()) {
            affected.insert(*id);
            if let Some(path) = self.original_paths.get(id) {
                affected.extend(path.iter().copied());
            }
            if let Some(category) = self.nodes.get(id) {
                affected.extend(category.path.iter().copied());
            }
        }
        affected
    }

    /// Turns the draft into a change set guarded by the base version.
    pub fn into_change_set(self) -> ChangeSet {
        let mut changes = ChangeSet::against(self.base_version);
        for id in &self.dirty {
            if let Some(category) = self.nodes.get(id) {
                changes.upserts.push(category.clone());
            }
        }
        changes.deletes = self.deleted;
        changes.history = self.history;
        changes
    }
}

impl SlugLookup for TreeDraft {
    fn active_owner(&self, slug: &str, exclude: Option<CategoryId>) -> Option<CategoryId> {
        self.active_slugs
            .get(slug)?
            .iter()
            .copied()
            .find(|owner| Some(*owner) != exclude)
    }

    fn retired_owner(&self, slug: &str) -> Option<CategoryId> {
        self.retired_slugs
            .get(slug)
            .copied()
            .filter(|owner| self.contains(*owner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// root -> a -> b, plus a second root `other`.
    fn fixture() -> (TreeDraft, Category, Category, Category, Category) {
        let root = Category::builder().name("root").slug("root").build();
        let a = Category::builder()
            .parent_id(Some(root.id))
            .name("a")
            .slug("a")
            .build();
        let b_id = CategoryId::new();
        let b = Category::builder()
            .id(b_id)
            .parent_id(Some(a.id))
            .path(vec![root.id, a.id, b_id])
            .name("b")
            .slug("b")
            .build();
        let other = Category::builder()
            .name("other")
            .slug("other")
            .sort_order(1)
            .build();
        let snapshot = TreeSnapshot::new(
            7,
            vec![root.clone(), a.clone(), b.clone(), other.clone()],
            vec![],
        );
        (TreeDraft::from_snapshot(&snapshot), root, a, b, other)
    }

    #[test]
    fn draft_starts_unchanged() {
        let (draft, ..) = fixture();
        assert!(draft.is_unchanged());
        assert_eq!(draft.base_version(), 7);
        assert_eq!(draft.len(), 4);
        let changes = draft.into_change_set();
        assert!(changes.is_empty());
        assert_eq!(changes.expected_version, Some(7));
    }

    #[test]
    fn subtree_membership() {
        let (draft, root, a, b, other) = fixture();
        assert!(draft.is_within_subtree(b.id, root.id));
        assert!(draft.is_within_subtree(a.id, a.id));
        assert!(!draft.is_within_subtree(root.id, a.id));
        assert!(!draft.is_within_subtree(other.id, root.id));
        assert_eq!(draft.subtree(root.id), vec![root.id, a.id, b.id]);
    }

    #[test]
    fn reparent_and_rebase_rewrites_descendant_paths() {
        let (mut draft, root, a, b, other) = fixture();
        draft.set_parent(a.id, Some(other.id));
        let changed = draft.rebase_subtree(a.id);

        assert_eq!(changed, vec![a.id, b.id]);
        assert_eq!(draft.get(a.id).unwrap().path, vec![other.id, a.id]);
        assert_eq!(draft.get(b.id).unwrap().path, vec![other.id, a.id, b.id]);
        assert_eq!(draft.get(b.id).unwrap().depth, 2);
        assert_eq!(draft.child_count(root.id), 0);
        assert_eq!(draft.child_count(other.id), 1);

        let affected = draft.affected_ids();
        for id in [root.id, a.id, b.id, other.id] {
            assert!(affected.contains(&id));
        }
    }

    #[test]
    fn rebase_treats_missing_parent_as_root() {
        let (mut draft, _, a, ..) = fixture();
        let ghost = CategoryId::new();
        draft.set_parent(a.id, Some(ghost));
        draft.rebase_subtree(a.id);
        assert_eq!(draft.get(a.id).unwrap().path, vec![a.id]);
        assert_eq!(draft.get(a.id).unwrap().depth, 0);
    }

    #[test]
    fn next_sort_order_appends() {
        let (draft, root, ..) = fixture();
        assert_eq!(draft.next_sort_order(None), 2);
        assert_eq!(draft.next_sort_order(Some(root.id)), 1);
        assert_eq!(draft.next_sort_order(Some(CategoryId::new())), 0);
    }

    #[test]
    fn normalize_closes_gaps() {
        let (mut draft, root, _, _, other) = fixture();
        draft.set_sort_order(other.id, 5);
        draft.set_sort_order(root.id, 3);
        assert_eq!(draft.normalize_siblings(None), 2);
        assert_eq!(draft.get(root.id).unwrap().sort_order, 0);
        assert_eq!(draft.get(other.id).unwrap().sort_order, 1);
        assert_eq!(draft.normalize_siblings(None), 0);
    }

    #[test]
    fn rename_slug_records_history_and_reserves_old_slug() {
        let (mut draft, _, a, ..) = fixture();
        draft.rename_slug(a.id, "a-renamed");

        assert_eq!(draft.get(a.id).unwrap().slug, "a-renamed");
        assert_eq!(draft.active_owner("a-renamed", None), Some(a.id));
        assert_eq!(draft.active_owner("a", None), None);
        assert_eq!(draft.retired_owner("a"), Some(a.id));

        let changes = draft.into_change_set();
        assert_eq!(changes.history.len(), 1);
        assert_eq!(changes.history[0].old_slug, "a");
        assert_eq!(changes.upserts.len(), 1);
    }

    #[test]
    fn update_cannot_change_parent() {
        let (mut draft, _, a, ..) = fixture();
        assert!(draft.update(a.id, |c| {
            c.name = "renamed".to_string();
            c.parent_id = None;
        }));
        assert_eq!(draft.get(a.id).unwrap().name, "renamed");
        assert!(draft.get(a.id).unwrap().parent_id.is_some());
        assert!(!draft.update(CategoryId::new(), |_| {}));
    }

    #[test]
    fn deactivation_frees_slug() {
        let (mut draft, _, a, ..) = fixture();
        draft.update(a.id, |c| c.is_active = false);
        assert_eq!(draft.active_owner("a", None), None);
    }

    #[test]
    fn remove_releases_slug_and_records_delete() {
        let (mut draft, root, a, b, _) = fixture();
        let removed = draft.remove(b.id).unwrap();
        assert_eq!(removed.id, b.id);
        assert_eq!(draft.child_count(a.id), 0);
        assert_eq!(draft.active_owner("b", None), None);

        let affected = draft.affected_ids();
        assert!(affected.contains(&root.id));
        assert!(affected.contains(&a.id));

        let changes = draft.into_change_set();
        assert_eq!(changes.deletes, vec![b.id]);
        assert!(changes.upserts.is_empty());
    }
}
