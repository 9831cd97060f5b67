//! Derived numbers over the category tree.
//!
//! - [`ProductCatalog`]: the external source of per-category product counts,
//!   read from PostgreSQL by [`PostgresProductCatalog`]
//! - [`CategoryAggregator`]: subtree product counts and [`TreeStats`]
//! - [`AggregateCache`]: explicit cache, invalidated by tree commits through
//!   the engine's observer hook and by product reassignment signals

pub mod aggregator;
pub mod cache;
pub mod catalog;
pub mod error;
pub mod postgres;
pub mod stats;

pub use aggregator::{CategoryAggregator, ProductCount};
pub use cache::AggregateCache;
pub use catalog::{InMemoryProductCatalog, ProductCatalog};
pub use error::{AggregateError, Result};
pub use postgres::PostgresProductCatalog;
pub use stats::TreeStats;
