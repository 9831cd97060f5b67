//! Slug registry: format rules, global uniqueness, suggestions.
//!
//! Slugs are global, not scoped to a parent. A slug is unavailable to a
//! category when another active category uses it, or when it appears in the
//! rename history of another category that still exists (so redirects from
//! that slug stay unambiguous). A category may always reclaim its own former
//! slugs.

use category_store::TreeSnapshot;
use common::CategoryId;
use serde::Serialize;

use crate::error::{CategoryError, Result};

/// Longest accepted slug.
pub const MAX_SLUG_LEN: usize = 100;

/// Used when a name contains no usable characters at all.
const FALLBACK_SLUG: &str = "category";

/// Read access to slug ownership, implemented by committed snapshots and
/// by in-progress drafts.
pub trait SlugLookup {
    /// An active category other than `exclude` currently using `slug`.
    fn active_owner(&self, slug: &str, exclude: Option<CategoryId>) -> Option<CategoryId>;

    /// The live category whose rename history retired `slug`.
    fn retired_owner(&self, slug: &str) -> Option<CategoryId>;
}

impl SlugLookup for TreeSnapshot {
    fn active_owner(&self, slug: &str, exclude: Option<CategoryId>) -> Option<CategoryId> {
        match self.by_active_slug(slug) {
            Some(owner) if Some(owner.id) != exclude => Some(owner.id),
            Some(_) => self
                .iter()
                .find(|c| c.is_active && c.slug == slug && Some(c.id) != exclude)
                .map(|c| c.id),
            None => None,
        }
    }

    fn retired_owner(&self, slug: &str) -> Option<CategoryId> {
        self.retired_slug_owner(slug)
    }
}

/// Derives a slug from free text.
///
/// Lowercases ASCII, turns every run of other characters into a single
/// hyphen, trims hyphens and truncates to [`MAX_SLUG_LEN`].
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    truncate_slug(&slug, MAX_SLUG_LEN)
}

fn truncate_slug(slug: &str, max_len: usize) -> String {
    if slug.len() <= max_len {
        return slug.to_string();
    }
    slug[..max_len].trim_end_matches('-').to_string()
}

/// Checks the slug format: lowercase ASCII alphanumerics separated by single
/// hyphens, 1 to [`MAX_SLUG_LEN`] characters.
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= MAX_SLUG_LEN
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && !slug.contains("--")
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Validates a caller-supplied slug.
pub fn check_format(slug: &str) -> Result<()> {
    if is_valid_slug(slug) {
        Ok(())
    } else {
        Err(CategoryError::invalid(
            "slug",
            format!(
                "'{slug}' must be 1-{MAX_SLUG_LEN} lowercase letters, digits or single hyphens"
            ),
        ))
    }
}

/// Who, if anyone, blocks a slug for a given category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlugStatus {
    Available,
    /// Used by another active category.
    Active(CategoryId),
    /// Retired by another live category and kept for redirects.
    Retired(CategoryId),
}

/// Outcome of a slug check, as reported to callers.
#[derive(Debug, Clone, Serialize)]
pub struct SlugValidation {
    pub slug: String,
    pub valid_format: bool,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_with: Option<CategoryId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

/// Uniqueness checks and suggestion generation over any [`SlugLookup`].
#[derive(Debug, Clone, Copy)]
pub struct SlugRegistry {
    suggestions: usize,
}

impl SlugRegistry {
    /// Creates a registry offering `suggestions` alternatives on collision.
    pub fn new(suggestions: usize) -> Self {
        Self {
            suggestions: suggestions.max(1),
        }
    }

    /// Reports who blocks `slug` for category `exclude` (or for a new one).
    pub fn status(
        &self,
        lookup: &impl SlugLookup,
        slug: &str,
        exclude: Option<CategoryId>,
    ) -> SlugStatus {
        if let Some(owner) = lookup.active_owner(slug, exclude) {
            return SlugStatus::Active(owner);
        }
        match lookup.retired_owner(slug) {
            Some(owner) if Some(owner) != exclude => SlugStatus::Retired(owner),
            _ => SlugStatus::Available,
        }
    }

    /// Fails with a `SlugTaken` conflict carrying suggestions if `slug` is
    /// blocked.
    pub fn ensure_available(
        &self,
        lookup: &impl SlugLookup,
        slug: &str,
        exclude: Option<CategoryId>,
    ) -> Result<()> {
        match self.status(lookup, slug, exclude) {
            SlugStatus::Available => Ok(()),
            SlugStatus::Active(owner) | SlugStatus::Retired(owner) => {
                Err(CategoryError::SlugTaken {
                    slug: slug.to_string(),
                    owner,
                    suggestions: self.suggest(lookup, slug, exclude),
                })
            }
        }
    }

    /// Generates available alternatives for `base` by numeric suffixing:
    /// `base-2`, `base-3`, ... Every candidate is checked against `lookup`
    /// before it is returned.
    pub fn suggest(
        &self,
        lookup: &impl SlugLookup,
        base: &str,
        exclude: Option<CategoryId>,
    ) -> Vec<String> {
        let base = match slugify(base) {
            s if s.is_empty() => FALLBACK_SLUG.to_string(),
            s => s,
        };
        let mut out = Vec::with_capacity(self.suggestions);
        let mut n: u64 = 2;
        while out.len() < self.suggestions {
            let suffix = format!("-{n}");
            let stem = truncate_slug(&base, MAX_SLUG_LEN - suffix.len());
            let candidate = format!("{stem}{suffix}");
            if self.status(lookup, &candidate, exclude) == SlugStatus::Available
                && !out.contains(&candidate)
            {
                out.push(candidate);
            }
            n += 1;
        }
        out
    }

    /// Picks the slug for a record: `requested` if given (format-checked),
    /// otherwise derived from `name`. Derived slugs that collide fall back to
    /// the first suggestion; requested ones fail.
    pub fn resolve(
        &self,
        lookup: &impl SlugLookup,
        requested: Option<&str>,
        name: &str,
        exclude: Option<CategoryId>,
    ) -> Result<String> {
        if let Some(slug) = requested {
            check_format(slug)?;
            self.ensure_available(lookup, slug, exclude)?;
            return Ok(slug.to_string());
        }
        self.first_available(lookup, name, exclude)
    }

    /// `slugify(text)` if available, else its first suggestion.
    pub fn first_available(
        &self,
        lookup: &impl SlugLookup,
        text: &str,
        exclude: Option<CategoryId>,
    ) -> Result<String> {
        let derived = match slugify(text) {
            s if s.is_empty() => FALLBACK_SLUG.to_string(),
            s => s,
        };
        if self.status(lookup, &derived, exclude) == SlugStatus::Available {
            return Ok(derived);
        }
        Self::new(1)
            .suggest(lookup, &derived, exclude)
            .into_iter()
            .next()
            .ok_or_else(|| CategoryError::invalid("slug", "no available slug could be derived"))
    }

    /// Full report for a candidate slug.
    pub fn validate(
        &self,
        lookup: &impl SlugLookup,
        slug: &str,
        exclude: Option<CategoryId>,
    ) -> SlugValidation {
        let valid_format = is_valid_slug(slug);
        let status = self.status(lookup, slug, exclude);
        let conflict_with = match status {
            SlugStatus::Available => None,
            SlugStatus::Active(owner) | SlugStatus::Retired(owner) => Some(owner),
        };
        let available = valid_format && conflict_with.is_none();
        SlugValidation {
            slug: slug.to_string(),
            valid_format,
            available,
            conflict_with,
            suggestions: if available {
                Vec::new()
            } else {
                self.suggest(lookup, slug, exclude)
            },
        }
    }
}
