//! HTTP handlers, grouped by concern.

pub mod aggregates;
pub mod bulk;
pub mod categories;
pub mod health;
pub mod maintenance;
pub mod metrics;
pub mod slugs;
