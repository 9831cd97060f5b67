//! Category hierarchy engine.
//!
//! This crate keeps a tree of product categories consistent under arbitrary
//! mutation:
//!
//! - [`CategoryService`]: create, update, move, reorder, delete (single and
//!   bulk) and all tree reads
//! - [`TreeDraft`]: working copy that maintains materialized paths and depths
//! - [`SlugRegistry`]: global slug uniqueness, suggestions and redirects
//! - [`validator`]: whole-tree scan and deterministic self-repair
//! - [`TreeObserver`]: commit hook for derived caches

pub mod bulk;
pub mod commands;
pub mod config;
pub mod error;
pub mod observer;
pub mod service;
pub mod slug;
pub mod tree;
pub mod validator;
pub mod views;

pub use commands::{
    BulkItemResult, BulkReport, CategoryPatch, CreateCategory, MoveCategory, ReorderCategories,
    ReorderItem, UpdateCategory, UpdateSeo,
};
pub use config::EngineConfig;
pub use error::{CategoryError, ErrorKind, Result};
pub use observer::{TreeChange, TreeObserver};
pub use service::CategoryService;
pub use slug::{SlugLookup, SlugRegistry, SlugStatus, SlugValidation, is_valid_slug, slugify};
pub use tree::TreeDraft;
pub use validator::{
    Issue, IssueKind, IssueTally, RepairReport, UnfixableIssue, ValidationReport, scan,
};
pub use views::{CategoryTreeNode, SlugResolution};

pub use tokio_util::sync::CancellationToken;
