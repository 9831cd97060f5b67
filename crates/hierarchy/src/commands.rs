//! Typed requests accepted by the category engine.
//!
//! Every request validates its own field-level rules; checks that need the
//! tree (parent existence, slug uniqueness, cycles) happen in the service.

use category_store::SeoMetadata;
use common::CategoryId;
use serde::{Deserialize, Serialize};

use crate::error::{CategoryError, Result};

/// Longest accepted category name.
pub const MAX_NAME_LEN: usize = 255;

fn check_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(CategoryError::invalid("name", "must not be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(CategoryError::invalid(
            "name",
            format!("must be at most {MAX_NAME_LEN} characters"),
        ));
    }
    Ok(())
}

fn default_active() -> bool {
    true
}

/// Request to create a category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCategory {
    /// Parent to create under, or `None` for a new root.
    #[serde(default)]
    pub parent_id: Option<CategoryId>,

    pub name: String,

    /// Explicit slug. Derived from `name` when absent.
    #[serde(default)]
    pub slug: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default = "default_active")]
    pub is_active: bool,

    #[serde(default)]
    pub seo: SeoMetadata,
}

impl CreateCategory {
    /// Creates a request for a new root category.
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            parent_id: None,
            name: name.into(),
            slug: None,
            description: None,
            is_active: true,
            seo: SeoMetadata::default(),
        }
    }

    /// Creates a request for a new child of `parent_id`.
    pub fn child(parent_id: CategoryId, name: impl Into<String>) -> Self {
        Self {
            parent_id: Some(parent_id),
            ..Self::root(name)
        }
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn with_seo(mut self, seo: SeoMetadata) -> Self {
        self.seo = seo;
        self
    }

    pub fn validate(&self) -> Result<()> {
        check_name(&self.name)
    }
}

/// Leaf attributes to change on a category. Absent fields are left alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryPatch {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub slug: Option<String>,

    /// An empty string clears the description.
    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub is_active: Option<bool>,

    #[serde(default)]
    pub seo: Option<SeoMetadata>,
}

impl CategoryPatch {
    /// Returns true if the patch sets no field.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.slug.is_none()
            && self.description.is_none()
            && self.is_active.is_none()
            && self.seo.is_none()
    }
}

/// Request to update the non-hierarchy attributes of a category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCategory {
    pub id: CategoryId,

    #[serde(flatten)]
    pub patch: CategoryPatch,
}

impl UpdateCategory {
    pub fn new(id: CategoryId) -> Self {
        Self {
            id,
            patch: CategoryPatch::default(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.patch.name = Some(name.into());
        self
    }

    pub fn slug(mut self, slug: impl Into<String>) -> Self {
        self.patch.slug = Some(slug.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.patch.description = Some(description.into());
        self
    }

    pub fn active(mut self, is_active: bool) -> Self {
        self.patch.is_active = Some(is_active);
        self
    }

    pub fn seo(mut self, seo: SeoMetadata) -> Self {
        self.patch.seo = Some(seo);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.patch.is_empty() {
            return Err(CategoryError::invalid(
                "patch",
                format!("update for category {} changes nothing", self.id),
            ));
        }
        if let Some(name) = &self.patch.name {
            check_name(name)?;
        }
        Ok(())
    }
}

/// Request to reparent a category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MoveCategory {
    pub id: CategoryId,

    /// New parent, or `None` to make the category a root.
    #[serde(default)]
    pub new_parent_id: Option<CategoryId>,
}

impl MoveCategory {
    pub fn to_root(id: CategoryId) -> Self {
        Self {
            id,
            new_parent_id: None,
        }
    }

    pub fn under(id: CategoryId, new_parent_id: CategoryId) -> Self {
        Self {
            id,
            new_parent_id: Some(new_parent_id),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.new_parent_id == Some(self.id) {
            return Err(CategoryError::SelfParent(self.id));
        }
        Ok(())
    }
}

/// Desired position of one category within its sibling group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderItem {
    pub id: CategoryId,
    pub target_order: i32,
}

/// Request to reorder categories that share one parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderCategories {
    pub items: Vec<ReorderItem>,
}

impl ReorderCategories {
    pub fn new(items: Vec<ReorderItem>) -> Self {
        Self { items }
    }

    /// Builds a request placing `ids` at positions `0..N` in the given order.
    pub fn in_order(ids: &[CategoryId]) -> Self {
        Self::new(
            ids.iter()
                .enumerate()
                .map(|(position, id)| ReorderItem {
                    id: *id,
                    target_order: position as i32,
                })
                .collect(),
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.items.is_empty() {
            return Err(CategoryError::InvalidBatch(
                "reorder needs at least one item".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::with_capacity(self.items.len());
        for item in &self.items {
            if !seen.insert(item.id) {
                return Err(CategoryError::InvalidBatch(format!(
                    "category {} is listed more than once",
                    item.id
                )));
            }
        }
        Ok(())
    }
}

/// Request to replace the SEO metadata of a category, optionally changing
/// its slug at the same time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSeo {
    pub id: CategoryId,

    #[serde(default)]
    pub slug: Option<String>,

    #[serde(default)]
    pub seo: SeoMetadata,
}

impl UpdateSeo {
    pub fn new(id: CategoryId, seo: SeoMetadata) -> Self {
        Self {
            id,
            slug: None,
            seo,
        }
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }
}

/// Outcome of one item of a bulk call.
#[derive(Debug)]
pub struct BulkItemResult<T> {
    /// Position of the item in the request.
    pub index: usize,

    /// Category the item addressed, when known.
    pub id: Option<CategoryId>,

    pub outcome: Result<T>,
}

impl<T> BulkItemResult<T> {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Per-item results of a bulk call, in request order.
#[derive(Debug)]
pub struct BulkReport<T> {
    pub results: Vec<BulkItemResult<T>>,
}

impl<T> BulkReport<T> {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_requires_a_name() {
        assert!(CreateCategory::root("Shoes").validate().is_ok());
        assert!(matches!(
            CreateCategory::root("   ").validate(),
            Err(CategoryError::InvalidField { field: "name", .. })
        ));
        assert!(CreateCategory::root("x".repeat(MAX_NAME_LEN + 1))
            .validate()
            .is_err());
    }

    #[test]
    fn create_deserializes_with_defaults() {
        let request: CreateCategory =
            serde_json::from_value(serde_json::json!({"name": "Shoes"})).unwrap();
        assert!(request.is_active);
        assert!(request.parent_id.is_none());
        assert!(request.slug.is_none());
        assert!(request.seo.is_empty());
    }

    #[test]
    fn empty_update_is_rejected() {
        let id = CategoryId::new();
        assert!(matches!(
            UpdateCategory::new(id).validate(),
            Err(CategoryError::InvalidField { field: "patch", .. })
        ));
        assert!(UpdateCategory::new(id).active(false).validate().is_ok());
        assert!(UpdateCategory::new(id).name("").validate().is_err());
    }

    #[test]
    fn update_flattens_patch_fields() {
        let id = CategoryId::new();
        let request: UpdateCategory =
            serde_json::from_value(serde_json::json!({"id": id, "name": "Boots"})).unwrap();
        assert_eq!(request.id, id);
        assert_eq!(request.patch.name.as_deref(), Some("Boots"));
    }

    #[test]
    fn move_onto_self_is_rejected() {
        let id = CategoryId::new();
        assert!(matches!(
            MoveCategory::under(id, id).validate(),
            Err(CategoryError::SelfParent(_))
        ));
        assert!(MoveCategory::to_root(id).validate().is_ok());
    }

    #[test]
    fn reorder_rejects_empty_and_duplicates() {
        let id = CategoryId::new();
        assert!(ReorderCategories::new(vec![]).validate().is_err());
        assert!(ReorderCategories::in_order(&[id, id]).validate().is_err());
        let ok = ReorderCategories::in_order(&[id, CategoryId::new()]);
        assert!(ok.validate().is_ok());
        assert_eq!(ok.items[1].target_order, 1);
    }
}
