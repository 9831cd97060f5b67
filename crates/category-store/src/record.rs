use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CategoryId;

/// SEO metadata attached to a category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeoMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meta_keywords: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_url: Option<String>,
}

impl SeoMetadata {
    /// Returns true if no SEO field is set.
    pub fn is_empty(&self) -> bool {
        self.meta_title.is_none()
            && self.meta_description.is_none()
            && self.meta_keywords.is_empty()
            && self.canonical_url.is_none()
    }
}

/// A persisted category node.
///
/// `path` and `depth` are denormalized from the parent chain. `path` lists
/// ancestor ids root-first and always ends with the node's own id, so
/// `depth == path.len() - 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,

    /// Parent node, or `None` for a root.
    pub parent_id: Option<CategoryId>,

    pub name: String,

    /// URL-safe identifier, unique among active categories.
    pub slug: String,

    pub description: Option<String>,

    /// Materialized path, root-first, ending in `id`.
    pub path: Vec<CategoryId>,

    pub depth: u32,

    /// Position within the sibling group.
    pub sort_order: i32,

    pub is_active: bool,

    #[serde(default)]
    pub seo: SeoMetadata,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Category {
    /// Creates a new category builder.
    pub fn builder() -> CategoryBuilder {
        CategoryBuilder::default()
    }

    /// Returns true if this node has no parent.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Returns the ancestor ids stored in the path, excluding the node itself.
    pub fn ancestor_ids(&self) -> &[CategoryId] {
        match self.path.split_last() {
            Some((last, ancestors)) if *last == self.id => ancestors,
            _ => &self.path,
        }
    }
}

/// A single slug rename, recorded append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlugHistoryEntry {
    pub category_id: CategoryId,
    pub old_slug: String,
    pub new_slug: String,
    pub changed_at: DateTime<Utc>,
}

impl SlugHistoryEntry {
    /// Records a rename happening now.
    pub fn new(
        category_id: CategoryId,
        old_slug: impl Into<String>,
        new_slug: impl Into<String>,
    ) -> Self {
        Self {
            category_id,
            old_slug: old_slug.into(),
            new_slug: new_slug.into(),
            changed_at: Utc::now(),
        }
    }
}

/// Builder for category records.
///
/// Fields that are not set get permissive defaults: a fresh id, a path
/// derived from `parent_id` alone, the current time for timestamps. The
/// builder does not enforce tree invariants, which makes it suitable for
/// seeding stores with deliberately inconsistent data.
#[derive(Debug, Default)]
pub struct CategoryBuilder {
    id: Option<CategoryId>,
    parent_id: Option<CategoryId>,
    name: Option<String>,
    slug: Option<String>,
    description: Option<String>,
    path: Option<Vec<CategoryId>>,
    depth: Option<u32>,
    sort_order: i32,
    is_active: Option<bool>,
    seo: SeoMetadata,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl CategoryBuilder {
    /// Sets the category ID. If not set, a new ID will be generated.
    pub fn id(mut self, id: CategoryId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn parent_id(mut self, parent_id: Option<CategoryId>) -> Self {
        self.parent_id = parent_id;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the stored path verbatim.
    pub fn path(mut self, path: Vec<CategoryId>) -> Self {
        self.path = Some(path);
        self
    }

    /// Sets the stored depth verbatim.
    pub fn depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn sort_order(mut self, sort_order: i32) -> Self {
        self.sort_order = sort_order;
        self
    }

    pub fn active(mut self, is_active: bool) -> Self {
        self.is_active = Some(is_active);
        self
    }

    pub fn seo(mut self, seo: SeoMetadata) -> Self {
        self.seo = seo;
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    /// Builds the category record.
    pub fn build(self) -> Category {
        let id = self.id.unwrap_or_default();
        let path = self.path.unwrap_or_else(|| match self.parent_id {
            Some(parent) => vec![parent, id],
            None => vec![id],
        });
        let depth = self
            .depth
            .unwrap_or_else(|| path.len().saturating_sub(1) as u32);
        let name = self.name.unwrap_or_default();
        let created_at = self.created_at.unwrap_or_else(Utc::now);

        Category {
            id,
            parent_id: self.parent_id,
            slug: self.slug.unwrap_or_else(|| name.to_lowercase()),
            name,
            description: self.description,
            path,
            depth,
            sort_order: self.sort_order,
            is_active: self.is_active.unwrap_or(true),
            seo: self.seo,
            created_at,
            updated_at: self.updated_at.unwrap_or(created_at),
        }
    }
}
