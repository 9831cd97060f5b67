//! Category service: the mutation engine and read API over a store.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use category_store::{
    Category, CategoryStore, SlugHistoryEntry, StoreError, TreeSnapshot,
};
use common::CategoryId;
use tokio::sync::Mutex;

use crate::commands::{
    CreateCategory, MoveCategory, ReorderCategories, UpdateCategory, UpdateSeo,
};
use crate::config::EngineConfig;
use crate::error::{CategoryError, Result};
use crate::observer::{TreeChange, TreeObserver};
use crate::slug::{SlugRegistry, SlugValidation, check_format};
use crate::tree::TreeDraft;
use crate::views::{CategoryTreeNode, SlugResolution};

/// Service for managing the category tree.
///
/// Reads are served from the store's last committed snapshot. Every mutation
/// runs under one exclusive write scope: it clones the snapshot into a
/// [`TreeDraft`], applies the change with all path, order and slug
/// bookkeeping, and commits the result as a single change set guarded by the
/// snapshot version.
pub struct CategoryService<S: CategoryStore> {
    store: S,
    config: EngineConfig,
    registry: SlugRegistry,
    write_scope: Mutex<()>,
    observers: RwLock<Vec<Arc<dyn TreeObserver>>>,
}

impl<S: CategoryStore> CategoryService<S> {
    /// Creates a service with default tuning.
    pub fn new(store: S) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: S, config: EngineConfig) -> Self {
        Self {
            store,
            registry: SlugRegistry::new(config.slug_suggestions),
            config,
            write_scope: Mutex::new(()),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Registers an observer notified after every commit.
    pub fn register_observer(&self, observer: Arc<dyn TreeObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub(crate) fn notify(&self, change: &TreeChange) {
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for observer in observers.iter() {
            observer.on_tree_change(change);
        }
    }

    /// Last committed snapshot.
    pub async fn snapshot(&self) -> Result<Arc<TreeSnapshot>> {
        Ok(self.store.snapshot().await?)
    }

    pub(crate) fn registry(&self) -> &SlugRegistry {
        &self.registry
    }

    /// Runs one mutation under the write scope and commits it.
    ///
    /// The closure receives a draft of the current snapshot. If it fails,
    /// nothing is committed. If it leaves the draft unchanged, nothing is
    /// committed either and no version is consumed.
    pub(crate) async fn execute<T, F>(&self, op: &'static str, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut TreeDraft) -> Result<T>,
    {
        let _guard = self.write_scope.lock().await;
        let result = self.execute_locked(mutate).await;
        match &result {
            Ok(_) => metrics::counter!("category_mutations_total", "op" => op).increment(1),
            Err(err) => {
                metrics::counter!("category_mutation_failures_total", "op" => op).increment(1);
                tracing::debug!(op, error = %err, "category mutation rejected");
            }
        }
        result
    }

    /// Same as [`CategoryService::execute`]; the caller holds the write scope.
    async fn execute_locked<T, F>(&self, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut TreeDraft) -> Result<T>,
    {
        let snapshot = self.store.snapshot().await?;
        let mut draft = TreeDraft::from_snapshot(&snapshot);
        let value = mutate(&mut draft)?;
        self.commit_draft(draft).await?;
        Ok(value)
    }

    /// Commits a draft and notifies observers. Returns the new version, or
    /// None when the draft had nothing to write.
    pub(crate) async fn commit_draft(&self, draft: TreeDraft) -> Result<Option<u64>> {
        if draft.is_unchanged() {
            return Ok(None);
        }
        let affected = draft.affected_ids();
        let changes = draft.into_change_set();
        let writes = changes.upserts.len();
        let deletes = changes.deletes.len();
        let version = self.store.commit(changes).await?;
        tracing::info!(version, writes, deletes, "category tree committed");
        self.notify(&TreeChange::Committed { version, affected });
        Ok(Some(version))
    }

    /// Takes the write scope for a multi-step operation.
    pub(crate) async fn lock_writes(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.write_scope.lock().await
    }

    // ---- reads -------------------------------------------------------------

    /// Loads one category.
    #[tracing::instrument(skip(self))]
    pub async fn get_category(&self, id: CategoryId) -> Result<Category> {
        let snapshot = self.snapshot().await?;
        snapshot.get(id).cloned().ok_or(CategoryError::NotFound(id))
    }

    /// Resolves a slug. Active slugs match directly; inactive categories
    /// still match their own slug; slugs found only in rename history
    /// redirect to the category that retired them.
    #[tracing::instrument(skip(self))]
    pub async fn get_by_slug(&self, slug: &str) -> Result<SlugResolution> {
        let snapshot = self.snapshot().await?;
        if let Some(category) = snapshot.by_active_slug(slug) {
            return Ok(SlugResolution {
                category: category.clone(),
                redirected_from: None,
            });
        }
        let mut inactive: Vec<&Category> =
            snapshot.iter().filter(|c| c.slug == slug).collect();
        inactive.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        if let Some(category) = inactive.first() {
            return Ok(SlugResolution {
                category: (*category).clone(),
                redirected_from: None,
            });
        }
        if let Some(owner) = snapshot.retired_slug_owner(slug)
            && let Some(category) = snapshot.get(owner)
        {
            return Ok(SlugResolution {
                category: category.clone(),
                redirected_from: Some(slug.to_string()),
            });
        }
        Err(CategoryError::SlugNotFound(slug.to_string()))
    }

    /// Ordered children of a category.
    #[tracing::instrument(skip(self))]
    pub async fn get_children(&self, id: CategoryId) -> Result<Vec<Category>> {
        let snapshot = self.snapshot().await?;
        if !snapshot.contains(id) {
            return Err(CategoryError::NotFound(id));
        }
        Ok(snapshot.children(id).into_iter().cloned().collect())
    }

    /// Ordered root categories.
    #[tracing::instrument(skip(self))]
    pub async fn get_roots(&self) -> Result<Vec<Category>> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot.roots().into_iter().cloned().collect())
    }

    /// Breadcrumb from the root down to `id`, inclusive.
    #[tracing::instrument(skip(self))]
    pub async fn get_path(&self, id: CategoryId) -> Result<Vec<Category>> {
        let snapshot = self.snapshot().await?;
        let path = snapshot.path(id).ok_or(CategoryError::NotFound(id))?;
        Ok(path.into_iter().cloned().collect())
    }

    /// `id` and all of its descendants, breadth-first.
    #[tracing::instrument(skip(self))]
    pub async fn get_subtree(&self, id: CategoryId) -> Result<Vec<Category>> {
        let snapshot = self.snapshot().await?;
        if !snapshot.contains(id) {
            return Err(CategoryError::NotFound(id));
        }
        Ok(snapshot
            .subtree_ids(id)
            .into_iter()
            .filter_map(|id| snapshot.get(id).cloned())
            .collect())
    }

    /// The whole tree, nested.
    #[tracing::instrument(skip(self))]
    pub async fn get_tree(&self) -> Result<Vec<CategoryTreeNode>> {
        let snapshot = self.snapshot().await?;
        Ok(CategoryTreeNode::forest(&snapshot))
    }

    /// Slug renames of a category, oldest first. History outlives the
    /// category itself.
    #[tracing::instrument(skip(self))]
    pub async fn slug_history(&self, id: CategoryId) -> Result<Vec<SlugHistoryEntry>> {
        let snapshot = self.snapshot().await?;
        let history: Vec<_> = snapshot.history_for(id).into_iter().cloned().collect();
        if history.is_empty() && !snapshot.contains(id) {
            return Err(CategoryError::NotFound(id));
        }
        Ok(history)
    }

    // ---- slugs -------------------------------------------------------------

    /// Derives an available slug from free text. `exclude` is the category
    /// the slug is meant for, whose own slugs do not count as taken.
    #[tracing::instrument(skip(self))]
    pub async fn generate_slug(&self, text: &str, exclude: Option<CategoryId>) -> Result<String> {
        let snapshot = self.snapshot().await?;
        self.registry.first_available(&*snapshot, text, exclude)
    }

    /// Reports format validity and availability of a slug.
    #[tracing::instrument(skip(self))]
    pub async fn validate_slug(
        &self,
        slug: &str,
        exclude: Option<CategoryId>,
    ) -> Result<SlugValidation> {
        let snapshot = self.snapshot().await?;
        Ok(self.registry.validate(&*snapshot, slug, exclude))
    }

    // ---- mutations ---------------------------------------------------------

    /// Creates a category at the end of its sibling group.
    #[tracing::instrument(skip(self))]
    pub async fn create_category(&self, cmd: CreateCategory) -> Result<Category> {
        let registry = self.registry;
        let created = self
            .execute("create", |draft| create_in(draft, &registry, &cmd))
            .await?;
        tracing::info!(id = %created.id, slug = %created.slug, "category created");
        Ok(created)
    }

    /// Updates leaf attributes. Slug changes are recorded in history.
    #[tracing::instrument(skip(self))]
    pub async fn update_category(&self, cmd: UpdateCategory) -> Result<Category> {
        let registry = self.registry;
        self.execute("update", |draft| update_in(draft, &registry, &cmd))
            .await
    }

    /// Replaces SEO metadata, optionally changing the slug.
    #[tracing::instrument(skip(self))]
    pub async fn update_seo(&self, cmd: UpdateSeo) -> Result<Category> {
        let registry = self.registry;
        self.execute("update_seo", |draft| update_seo_in(draft, &registry, &cmd))
            .await
    }

    /// Moves a category, with its subtree, under a new parent.
    #[tracing::instrument(skip(self))]
    pub async fn move_category(&self, cmd: MoveCategory) -> Result<Category> {
        let moved = self.execute("move", |draft| move_in(draft, &cmd)).await?;
        tracing::info!(id = %moved.id, depth = moved.depth, "category moved");
        Ok(moved)
    }

    /// Reorders categories within one sibling group. Returns the whole group
    /// in its new order.
    #[tracing::instrument(skip(self))]
    pub async fn reorder_categories(&self, cmd: ReorderCategories) -> Result<Vec<Category>> {
        self.execute("reorder", |draft| reorder_in(draft, &cmd))
            .await
    }

    /// Deletes a leaf category. Returns the removed record.
    #[tracing::instrument(skip(self))]
    pub async fn delete_category(&self, id: CategoryId) -> Result<Category> {
        let removed = self.execute("delete", |draft| delete_in(draft, id)).await?;
        tracing::info!(%id, slug = %removed.slug, "category deleted");
        Ok(removed)
    }
}

// ---- draft operations ------------------------------------------------------
//
// Each operation checks everything it needs before touching the draft, so a
// failed operation leaves the draft exactly as it found it. Bulk calls rely on
// this to apply several items to one draft.

pub(crate) fn create_in(
    draft: &mut TreeDraft,
    registry: &SlugRegistry,
    cmd: &CreateCategory,
) -> Result<Category> {
    cmd.validate()?;
    if let Some(parent) = cmd.parent_id
        && !draft.contains(parent)
    {
        return Err(CategoryError::ParentNotFound(parent));
    }
    let slug = registry.resolve(&*draft, cmd.slug.as_deref(), &cmd.name, None)?;

    let id = CategoryId::new();
    let (path, depth) = draft.placement(cmd.parent_id, id);
    let now = draft.now();
    let category = Category {
        id,
        parent_id: cmd.parent_id,
        name: cmd.name.trim().to_string(),
        slug,
        description: cmd.description.clone().filter(|d| !d.is_empty()),
        path,
        depth,
        sort_order: draft.next_sort_order(cmd.parent_id),
        is_active: cmd.is_active,
        seo: cmd.seo.clone(),
        created_at: now,
        updated_at: now,
    };
    draft.insert(category.clone());
    Ok(category)
}

pub(crate) fn update_in(
    draft: &mut TreeDraft,
    registry: &SlugRegistry,
    cmd: &UpdateCategory,
) -> Result<Category> {
    cmd.validate()?;
    let current = draft.get(cmd.id).ok_or(CategoryError::NotFound(cmd.id))?;
    let patch = &cmd.patch;

    let new_slug = patch
        .slug
        .as_deref()
        .filter(|slug| *slug != current.slug)
        .map(str::to_string);
    let will_be_active = patch.is_active.unwrap_or(current.is_active);
    let reactivating = will_be_active && !current.is_active;

    if let Some(slug) = &new_slug {
        check_format(slug)?;
        registry.ensure_available(&*draft, slug, Some(cmd.id))?;
    } else if reactivating {
        registry.ensure_available(&*draft, &current.slug, Some(cmd.id))?;
    }

    draft.update(cmd.id, |category| {
        if let Some(name) = &patch.name {
            category.name = name.trim().to_string();
        }
        if let Some(description) = &patch.description {
            category.description = Some(description.clone()).filter(|d| !d.is_empty());
        }
        if let Some(seo) = &patch.seo {
            category.seo = seo.clone();
        }
        category.is_active = will_be_active;
    });
    if let Some(slug) = &new_slug {
        draft.rename_slug(cmd.id, slug);
    }
    draft
        .get(cmd.id)
        .cloned()
        .ok_or(CategoryError::NotFound(cmd.id))
}

pub(crate) fn update_seo_in(
    draft: &mut TreeDraft,
    registry: &SlugRegistry,
    cmd: &UpdateSeo,
) -> Result<Category> {
    let mut update = UpdateCategory::new(cmd.id).seo(cmd.seo.clone());
    update.patch.slug = cmd.slug.clone();
    update_in(draft, registry, &update)
}

pub(crate) fn move_in(draft: &mut TreeDraft, cmd: &MoveCategory) -> Result<Category> {
    cmd.validate()?;
    let current = draft.get(cmd.id).ok_or(CategoryError::NotFound(cmd.id))?;
    let old_parent = current.parent_id;
    if let Some(parent) = cmd.new_parent_id {
        if !draft.contains(parent) {
            return Err(CategoryError::ParentNotFound(parent));
        }
        if draft.is_within_subtree(parent, cmd.id) {
            return Err(CategoryError::Cycle {
                id: cmd.id,
                new_parent: parent,
            });
        }
    }
    if old_parent == cmd.new_parent_id {
        return Ok(current.clone());
    }

    let position = draft.next_sort_order(cmd.new_parent_id);
    draft.set_parent(cmd.id, cmd.new_parent_id);
    draft.set_sort_order(cmd.id, position);
    draft.rebase_subtree(cmd.id);
    draft.normalize_siblings(old_parent);
    draft.normalize_siblings(cmd.new_parent_id);

    draft
        .get(cmd.id)
        .cloned()
        .ok_or(CategoryError::NotFound(cmd.id))
}

pub(crate) fn reorder_in(draft: &mut TreeDraft, cmd: &ReorderCategories) -> Result<Vec<Category>> {
    cmd.validate()?;
    let mut parent = None;
    let mut first = None;
    for item in &cmd.items {
        let category = draft.get(item.id).ok_or(CategoryError::NotFound(item.id))?;
        match first {
            None => {
                first = Some(item.id);
                parent = Some(category.parent_id);
            }
            Some(first_id) if parent != Some(category.parent_id) => {
                return Err(CategoryError::MixedParents {
                    first: first_id,
                    other: item.id,
                });
            }
            Some(_) => {}
        }
    }
    let parent = parent.flatten();

    let group = draft.siblings(parent);
    let ordered = reorder_group(draft, &group, cmd);
    draft.assign_order(&ordered);

    Ok(ordered
        .iter()
        .filter_map(|id| draft.get(*id).cloned())
        .collect())
}

/// Computes the new order of a sibling group.
///
/// Listed items claim slots by (target, current sort order, id), each taking
/// the first free slot at or after its clamped target (or the last free slot
/// when none is left after it). Unlisted siblings fill the remaining slots in
/// their current order. The result depends only on the targets and the
/// relative order of the group, so reapplying it changes nothing.
fn reorder_group(draft: &TreeDraft, group: &[CategoryId], cmd: &ReorderCategories) -> Vec<CategoryId> {
    let len = group.len();
    let mut listed: Vec<_> = cmd
        .items
        .iter()
        .map(|item| {
            let current = draft.get(item.id).map_or(0, |c| c.sort_order);
            (item.target_order, current, item.id)
        })
        .collect();
    listed.sort();

    let mut slots: Vec<Option<CategoryId>> = vec![None; len];
    for (target, _, id) in &listed {
        let desired = (*target).clamp(0, len as i32 - 1) as usize;
        let slot = (desired..len)
            .find(|i| slots[*i].is_none())
            .or_else(|| (0..desired).rev().find(|i| slots[*i].is_none()));
        if let Some(slot) = slot {
            slots[slot] = Some(*id);
        }
    }

    let listed_ids: HashSet<_> = listed.iter().map(|(_, _, id)| *id).collect();
    let mut unlisted = group.iter().filter(|id| !listed_ids.contains(id));
    slots
        .into_iter()
        .filter_map(|slot| slot.or_else(|| unlisted.next().copied()))
        .collect()
}

pub(crate) fn delete_in(draft: &mut TreeDraft, id: CategoryId) -> Result<Category> {
    let parent = draft.get(id).ok_or(CategoryError::NotFound(id))?.parent_id;
    let children = draft.child_count(id);
    if children > 0 {
        return Err(CategoryError::HasChildren { id, children });
    }
    let removed = draft.remove(id).ok_or(CategoryError::NotFound(id))?;
    draft.normalize_siblings(parent);
    Ok(removed)
}

/// Rebuilds a commit error for each item of a chunk that failed as a whole.
pub(crate) fn chunk_failure(err: &CategoryError) -> CategoryError {
    match err {
        CategoryError::ConcurrentModification => CategoryError::ConcurrentModification,
        other => CategoryError::Store(StoreError::Unavailable(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use category_store::InMemoryCategoryStore;
    use std::sync::Mutex as StdMutex;

    fn service() -> CategoryService<InMemoryCategoryStore> {
        CategoryService::new(InMemoryCategoryStore::new())
    }

    #[derive(Default)]
    struct Recorder(StdMutex<Vec<TreeChange>>);

    impl TreeObserver for Recorder {
        fn on_tree_change(&self, change: &TreeChange) {
            self.0.lock().unwrap().push(change.clone());
        }
    }

    #[tokio::test]
    async fn create_appends_to_sibling_group() {
        let service = service();
        let root = service
            .create_category(CreateCategory::root("Apparel"))
            .await
            .unwrap();
        let a = service
            .create_category(CreateCategory::child(root.id, "Shirts"))
            .await
            .unwrap();
        let b = service
            .create_category(CreateCategory::child(root.id, "Pants"))
            .await
            .unwrap();

        assert_eq!(root.slug, "apparel");
        assert_eq!(a.sort_order, 0);
        assert_eq!(b.sort_order, 1);
        assert_eq!(b.depth, 1);
        assert_eq!(b.path, vec![root.id, b.id]);
    }

    #[tokio::test]
    async fn create_under_missing_parent_fails() {
        let service = service();
        let missing = CategoryId::new();
        let result = service
            .create_category(CreateCategory::child(missing, "Orphan"))
            .await;
        assert!(matches!(result, Err(CategoryError::ParentNotFound(id)) if id == missing));
        assert!(service.get_roots().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn noop_move_does_not_commit() {
        let service = service();
        let root = service
            .create_category(CreateCategory::root("Root"))
            .await
            .unwrap();
        let before = service.store().snapshot().await.unwrap().version();
        service
            .move_category(MoveCategory::to_root(root.id))
            .await
            .unwrap();
        assert_eq!(service.store().snapshot().await.unwrap().version(), before);
    }

    #[tokio::test]
    async fn observers_see_affected_ancestors() {
        let service = service();
        let recorder = Arc::new(Recorder::default());
        service.register_observer(recorder.clone());

        let root = service
            .create_category(CreateCategory::root("Root"))
            .await
            .unwrap();
        let child = service
            .create_category(CreateCategory::child(root.id, "Child"))
            .await
            .unwrap();

        let changes = recorder.0.lock().unwrap();
        assert_eq!(changes.len(), 2);
        match &changes[1] {
            TreeChange::Committed { version, affected } => {
                assert_eq!(*version, 2);
                assert!(affected.contains(&root.id));
                assert!(affected.contains(&child.id));
            }
            other => panic!("unexpected change {other:?}"),
        }
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_internal() {
        let store = InMemoryCategoryStore::new();
        let service = CategoryService::new(store.clone());
        store.set_fail_on_commit(true);
        let err = service
            .create_category(CreateCategory::root("Down"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Internal);
    }

    #[test]
    fn reorder_group_places_listed_then_fills() {
        let ids: Vec<CategoryId> = (0..4).map(|_| CategoryId::new()).collect();
        let categories: Vec<Category> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| Category::builder().id(*id).sort_order(i as i32).build())
            .collect();
        let draft = TreeDraft::from_snapshot(&TreeSnapshot::new(0, categories, vec![]));

        // Move the last one to the front.
        let cmd = ReorderCategories::new(vec![crate::commands::ReorderItem {
            id: ids[3],
            target_order: 0,
        }]);
        let ordered = reorder_group(&draft, &ids, &cmd);
        assert_eq!(ordered, vec![ids[3], ids[0], ids[1], ids[2]]);

        // Out-of-range targets clamp to the end.
        let cmd = ReorderCategories::new(vec![crate::commands::ReorderItem {
            id: ids[0],
            target_order: 99,
        }]);
        let ordered = reorder_group(&draft, &ids, &cmd);
        assert_eq!(ordered, vec![ids[1], ids[2], ids[3], ids[0]]);
    }
}
