use std::collections::{HashMap, HashSet, VecDeque};

use crate::{Category, CategoryId, ChangeSet, SlugHistoryEntry};

/// An immutable, committed view of the whole category table.
///
/// Child lists and slug lookups are derived from the records once, when the
/// snapshot is built, so reads never walk the parent chain. Nodes are held in
/// an arena keyed by id; parent references are plain ids.
#[derive(Debug, Clone, Default)]
pub struct TreeSnapshot {
    version: u64,
    nodes: HashMap<CategoryId, Category>,
    /// Sibling groups keyed by parent id, ordered by (sort_order, created_at, id).
    children: HashMap<Option<CategoryId>, Vec<CategoryId>>,
    /// Active slug to owner. With corrupted duplicates the earliest-created wins.
    active_slugs: HashMap<String, CategoryId>,
    history: Vec<SlugHistoryEntry>,
    /// Old slug to index of the most recent history entry that retired it.
    retired_slugs: HashMap<String, usize>,
}

impl TreeSnapshot {
    /// Builds a snapshot and its indexes from raw records.
    pub fn new(version: u64, categories: Vec<Category>, history: Vec<SlugHistoryEntry>) -> Self {
        let nodes = categories.into_iter().map(|c| (c.id, c)).collect();
        let mut snapshot = Self {
            version,
            nodes,
            history,
            ..Default::default()
        };
        snapshot.rebuild_indexes();
        snapshot
    }

    fn rebuild_indexes(&mut self) {
        let mut children: HashMap<Option<CategoryId>, Vec<CategoryId>> = HashMap::new();
        for category in self.nodes.values() {
            children.entry(category.parent_id).or_default().push(category.id);
        }
        for group in children.values_mut() {
            group.sort_by(|a, b| {
                let (a, b) = (&self.nodes[a], &self.nodes[b]);
                a.sort_order
                    .cmp(&b.sort_order)
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.id.cmp(&b.id))
            });
        }

        let mut active: Vec<&Category> = self.nodes.values().filter(|c| c.is_active).collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let mut active_slugs = HashMap::with_capacity(active.len());
        for category in active {
            active_slugs
                .entry(category.slug.clone())
                .or_insert(category.id);
        }

        let mut retired_slugs = HashMap::new();
        for (index, entry) in self.history.iter().enumerate() {
            retired_slugs.insert(entry.old_slug.clone(), index);
        }

        self.children = children;
        self.active_slugs = active_slugs;
        self.retired_slugs = retired_slugs;
    }

    /// Produces the next snapshot with `changes` applied and the version bumped.
    ///
    /// The change set must already have passed [`ChangeSet::validate`].
    pub fn apply(&self, changes: &ChangeSet) -> TreeSnapshot {
        let mut next = TreeSnapshot {
            version: self.version + 1,
            nodes: self.nodes.clone(),
            history: self.history.clone(),
            ..Default::default()
        };
        for id in &changes.deletes {
            next.nodes.remove(id);
        }
        for category in &changes.upserts {
            next.nodes.insert(category.id, category.clone());
        }
        next.history.extend(changes.history.iter().cloned());
        next.rebuild_indexes();
        next
    }

    /// Tree version this snapshot was committed at.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: CategoryId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: CategoryId) -> Option<&Category> {
        self.nodes.get(&id)
    }

    /// Iterates over all categories in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.nodes.values()
    }

    /// Ordered ids of the sibling group under `parent` (`None` for roots).
    pub fn child_ids(&self, parent: Option<CategoryId>) -> &[CategoryId] {
        self.children
            .get(&parent)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Ordered children of `id`.
    pub fn children(&self, id: CategoryId) -> Vec<&Category> {
        self.resolve(self.child_ids(Some(id)))
    }

    /// Ordered root categories.
    pub fn roots(&self) -> Vec<&Category> {
        self.resolve(self.child_ids(None))
    }

    /// Every parent id that has at least one child, including dangling ones.
    pub fn parent_keys(&self) -> impl Iterator<Item = Option<CategoryId>> + '_ {
        self.children.keys().copied()
    }

    fn resolve(&self, ids: &[CategoryId]) -> Vec<&Category> {
        ids.iter().filter_map(|id| self.nodes.get(id)).collect()
    }

    /// Breadcrumb for `id`: the records named by its stored path, root first.
    ///
    /// Returns None if the category does not exist.
    pub fn path(&self, id: CategoryId) -> Option<Vec<&Category>> {
        let category = self.nodes.get(&id)?;
        Some(self.resolve(&category.path))
    }

    /// `id` followed by all of its descendants in breadth-first order.
    ///
    /// Returns an empty list if the category does not exist. Safe on
    /// corrupted data: each node is visited at most once.
    pub fn subtree_ids(&self, id: CategoryId) -> Vec<CategoryId> {
        if !self.contains(id) {
            return Vec::new();
        }
        let mut seen = HashSet::from([id]);
        let mut order = vec![id];
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for child in self.child_ids(Some(current)) {
                if seen.insert(*child) {
                    order.push(*child);
                    queue.push_back(*child);
                }
            }
        }
        order
    }

    /// Looks up the active category currently using `slug`.
    pub fn by_active_slug(&self, slug: &str) -> Option<&Category> {
        self.active_slugs
            .get(slug)
            .and_then(|id| self.nodes.get(id))
    }

    /// All active slugs currently in use.
    pub fn active_slugs(&self) -> impl Iterator<Item = &str> {
        self.active_slugs.keys().map(String::as_str)
    }

    /// The category a retired slug last belonged to, if that category still
    /// exists.
    pub fn retired_slug_owner(&self, slug: &str) -> Option<CategoryId> {
        let index = *self.retired_slugs.get(slug)?;
        let owner = self.history[index].category_id;
        self.contains(owner).then_some(owner)
    }

    /// Complete slug history, in commit order.
    pub fn history(&self) -> &[SlugHistoryEntry] {
        &self.history
    }

    /// Slug history of a single category, oldest first.
    pub fn history_for(&self, id: CategoryId) -> Vec<&SlugHistoryEntry> {
        self.history
            .iter()
            .filter(|entry| entry.category_id == id)
            .collect()
    }
}
