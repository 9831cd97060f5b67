use std::collections::HashMap;

use async_trait::async_trait;
use common::CategoryId;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::catalog::ProductCatalog;
use crate::error::{AggregateError, Result};

/// Product catalog backed by the `product_categories` table.
///
/// The table is written by the product side; this catalog only counts rows
/// per category.
#[derive(Clone)]
pub struct PostgresProductCatalog {
    pool: PgPool,
}

impl PostgresProductCatalog {
    /// Creates a catalog over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ProductCatalog for PostgresProductCatalog {
    async fn count_products(&self, category_ids: &[CategoryId]) -> Result<HashMap<CategoryId, i64>> {
        if category_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids: Vec<Uuid> = category_ids.iter().map(CategoryId::as_uuid).collect();

        let rows = sqlx::query(
            r#"
            SELECT category_id, COUNT(*) AS product_count
            FROM product_categories
            WHERE category_id = ANY($1)
            GROUP BY category_id
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(catalog_error)?;

        rows.into_iter()
            .map(|row| {
                let id: Uuid = row.try_get("category_id").map_err(catalog_error)?;
                let count: i64 = row.try_get("product_count").map_err(catalog_error)?;
                Ok((CategoryId::from_uuid(id), count))
            })
            .collect()
    }
}

fn catalog_error(err: sqlx::Error) -> AggregateError {
    tracing::warn!(error = %err, "product count query failed");
    AggregateError::Catalog(err.to_string())
}
