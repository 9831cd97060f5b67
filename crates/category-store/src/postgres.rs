use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    Category, CategoryId, ChangeSet, Result, SeoMetadata, SlugHistoryEntry, StoreError,
    TreeSnapshot,
    store::{CategoryStore, check_commit},
};

/// PostgreSQL-backed category store.
///
/// The committed tree is cached as a snapshot after the first read and
/// advanced in place by this store's own commits. The store assumes it is the
/// only writer to its tables; call [`PostgresCategoryStore::reload`] after
/// out-of-band edits.
#[derive(Clone)]
pub struct PostgresCategoryStore {
    pool: PgPool,
    cache: Arc<RwLock<Option<Arc<TreeSnapshot>>>>,
}

impl PostgresCategoryStore {
    /// Creates a new PostgreSQL category store.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            cache: Arc::default(),
        }
    }

    /// Connects a pool to `database_url` and creates a store over it.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        tracing::info!("connected to category database");
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    /// Drops the cached snapshot and reloads it from the database.
    pub async fn reload(&self) -> Result<Arc<TreeSnapshot>> {
        let snapshot = Arc::new(self.load_snapshot().await?);
        *self.cache.write().await = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    async fn load_snapshot(&self) -> Result<TreeSnapshot> {
        let version: i64 =
            sqlx::query_scalar("SELECT version FROM category_tree_version WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?
                .unwrap_or(0);

        let rows = sqlx::query(
            r#"
            SELECT id, parent_id, name, slug, description, path, depth, sort_order,
                   is_active, seo, created_at, updated_at
            FROM categories
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        let categories = rows
            .into_iter()
            .map(Self::row_to_category)
            .collect::<Result<Vec<_>>>()?;

        let rows = sqlx::query(
            r#"
            SELECT category_id, old_slug, new_slug, changed_at
            FROM category_slug_history
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        let history = rows
            .into_iter()
            .map(Self::row_to_history)
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            version,
            categories = categories.len(),
            "loaded category snapshot"
        );

        Ok(TreeSnapshot::new(version as u64, categories, history))
    }

    fn row_to_category(row: PgRow) -> Result<Category> {
        let seo_json: serde_json::Value = row.try_get("seo")?;
        let seo: SeoMetadata = serde_json::from_value(seo_json)?;
        let path: Vec<Uuid> = row.try_get("path")?;
        let depth: i32 = row.try_get("depth")?;

        Ok(Category {
            id: CategoryId::from_uuid(row.try_get::<Uuid, _>("id")?),
            parent_id: row
                .try_get::<Option<Uuid>, _>("parent_id")?
                .map(CategoryId::from_uuid),
            name: row.try_get("name")?,
            slug: row.try_get("slug")?,
            description: row.try_get("description")?,
            path: path.into_iter().map(CategoryId::from_uuid).collect(),
            depth: depth.max(0) as u32,
            sort_order: row.try_get("sort_order")?,
            is_active: row.try_get("is_active")?,
            seo,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_history(row: PgRow) -> Result<SlugHistoryEntry> {
        Ok(SlugHistoryEntry {
            category_id: CategoryId::from_uuid(row.try_get::<Uuid, _>("category_id")?),
            old_slug: row.try_get("old_slug")?,
            new_slug: row.try_get("new_slug")?,
            changed_at: row.try_get("changed_at")?,
        })
    }
}

#[async_trait]
impl CategoryStore for PostgresCategoryStore {
    async fn snapshot(&self) -> Result<Arc<TreeSnapshot>> {
        if let Some(snapshot) = self.cache.read().await.as_ref() {
            return Ok(Arc::clone(snapshot));
        }
        self.reload().await
    }

    async fn commit(&self, changes: ChangeSet) -> Result<u64> {
        let base = self.snapshot().await?;
        changes
            .validate(&base)
            .map_err(StoreError::InvalidChangeSet)?;

        let mut tx = self.pool.begin().await?;

        // Row lock on the version counter serializes writers across processes.
        let actual: i64 = sqlx::query_scalar(
            "SELECT version FROM category_tree_version WHERE id = 1 FOR UPDATE",
        )
        .fetch_one(&mut *tx)
        .await?;
        if let Some(expected) = changes.expected_version
            && expected != actual as u64
        {
            return Err(StoreError::ConcurrencyConflict {
                expected,
                actual: actual as u64,
            });
        }

        if !changes.deletes.is_empty() {
            let ids: Vec<Uuid> = changes.deletes.iter().map(|id| id.as_uuid()).collect();
            sqlx::query("DELETE FROM categories WHERE id = ANY($1)")
                .bind(&ids)
                .execute(&mut *tx)
                .await?;
        }

        for category in &changes.upserts {
            let path: Vec<Uuid> = category.path.iter().map(|id| id.as_uuid()).collect();
            let seo = serde_json::to_value(&category.seo)?;

            sqlx::query(
                r#"
                INSERT INTO categories (id, parent_id, name, slug, description, path, depth,
                                        sort_order, is_active, seo, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                ON CONFLICT (id) DO UPDATE SET
                    parent_id = EXCLUDED.parent_id,
                    name = EXCLUDED.name,
                    slug = EXCLUDED.slug,
                    description = EXCLUDED.description,
                    path = EXCLUDED.path,
                    depth = EXCLUDED.depth,
                    sort_order = EXCLUDED.sort_order,
                    is_active = EXCLUDED.is_active,
                    seo = EXCLUDED.seo,
                    updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(category.id.as_uuid())
            .bind(category.parent_id.map(|id| id.as_uuid()))
            .bind(&category.name)
            .bind(&category.slug)
            .bind(&category.description)
            .bind(&path)
            .bind(category.depth as i32)
            .bind(category.sort_order)
            .bind(category.is_active)
            .bind(seo)
            .bind(category.created_at)
            .bind(category.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        for entry in &changes.history {
            sqlx::query(
                r#"
                INSERT INTO category_slug_history (category_id, old_slug, new_slug, changed_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(entry.category_id.as_uuid())
            .bind(&entry.old_slug)
            .bind(&entry.new_slug)
            .bind(entry.changed_at)
            .execute(&mut *tx)
            .await?;
        }

        let version: i64 = sqlx::query_scalar(
            "UPDATE category_tree_version SET version = version + 1 WHERE id = 1 RETURNING version",
        )
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        metrics::counter!("category_store_commits_total", "backend" => "postgres").increment(1);

        let mut cache = self.cache.write().await;
        *cache = match cache.take() {
            Some(current)
                if current.version() + 1 == version as u64
                    && check_commit(&current, &changes).is_ok() =>
            {
                Some(Arc::new(current.apply(&changes)))
            }
            _ => None,
        };

        Ok(version as u64)
    }
}
