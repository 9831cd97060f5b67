use std::collections::HashSet;

use crate::{Category, CategoryId, SlugHistoryEntry, TreeSnapshot};

/// A batch of record changes applied atomically by a store.
///
/// Either every upsert, delete and history append lands, or none does.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    /// Tree version the change set was computed against.
    /// If None, no version check is performed.
    pub expected_version: Option<u64>,

    /// Records to insert or overwrite, keyed by their id.
    pub upserts: Vec<Category>,

    /// Records to remove.
    pub deletes: Vec<CategoryId>,

    /// Slug history entries to append.
    pub history: Vec<SlugHistoryEntry>,
}

impl ChangeSet {
    /// Creates an empty change set with no version check.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty change set expecting the tree to be at `version`.
    pub fn against(version: u64) -> Self {
        Self {
            expected_version: Some(version),
            ..Default::default()
        }
    }

    pub fn upsert(mut self, category: Category) -> Self {
        self.upserts.push(category);
        self
    }

    pub fn delete(mut self, id: CategoryId) -> Self {
        self.deletes.push(id);
        self
    }

    pub fn record_rename(mut self, entry: SlugHistoryEntry) -> Self {
        self.history.push(entry);
        self
    }

    /// Returns true if applying this change set would change nothing.
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty() && self.history.is_empty()
    }

    /// Ids of every record written or removed.
    pub fn touched_ids(&self) -> Vec<CategoryId> {
        self.upserts
            .iter()
            .map(|c| c.id)
            .chain(self.deletes.iter().copied())
            .collect()
    }

    /// Checks the change set for internal consistency against the snapshot it
    /// will be applied to.
    pub fn validate(&self, base: &TreeSnapshot) -> Result<(), String> {
        let mut upserted = HashSet::with_capacity(self.upserts.len());
        for category in &self.upserts {
            if !upserted.insert(category.id) {
                return Err(format!("category {} is upserted twice", category.id));
            }
        }

        let mut deleted = HashSet::with_capacity(self.deletes.len());
        for id in &self.deletes {
            if upserted.contains(id) {
                return Err(format!("category {id} is both upserted and deleted"));
            }
            if !deleted.insert(*id) {
                return Err(format!("category {id} is deleted twice"));
            }
            if !base.contains(*id) {
                return Err(format!("cannot delete unknown category {id}"));
            }
        }

        for entry in &self.history {
            if deleted.contains(&entry.category_id) {
                return Err(format!(
                    "history entry references deleted category {}",
                    entry.category_id
                ));
            }
            if !upserted.contains(&entry.category_id) && !base.contains(entry.category_id) {
                return Err(format!(
                    "history entry references unknown category {}",
                    entry.category_id
                ));
            }
        }

        Ok(())
    }
}
