//! Bulk create, update, delete and SEO update.
//!
//! Items are processed independently, in request order, in chunks of
//! [`EngineConfig::bulk_chunk_size`](crate::EngineConfig). Each chunk takes the
//! write scope, applies its items to one draft and commits once; the scope is
//! released between chunks. A failing item never affects its neighbours. If a
//! chunk's commit fails, every item that had succeeded in that chunk reports
//! the commit error instead.

use category_store::{Category, CategoryStore};
use common::CategoryId;
use tokio_util::sync::CancellationToken;

use crate::commands::{BulkItemResult, BulkReport, CreateCategory, UpdateCategory, UpdateSeo};
use crate::error::{CategoryError, Result};
use crate::service::{
    CategoryService, chunk_failure, create_in, delete_in, update_in, update_seo_in,
};
use crate::tree::TreeDraft;

impl<S: CategoryStore> CategoryService<S> {
    /// Creates many categories.
    #[tracing::instrument(skip(self, items, cancel), fields(items = items.len()))]
    pub async fn bulk_create(
        &self,
        items: Vec<CreateCategory>,
        cancel: &CancellationToken,
    ) -> Result<BulkReport<Category>> {
        let registry = *self.registry();
        self.run_bulk("bulk_create", &items, cancel, |_| None, |draft, item| {
            create_in(draft, &registry, item)
        })
        .await
    }

    /// Updates many categories.
    #[tracing::instrument(skip(self, items, cancel), fields(items = items.len()))]
    pub async fn bulk_update(
        &self,
        items: Vec<UpdateCategory>,
        cancel: &CancellationToken,
    ) -> Result<BulkReport<Category>> {
        let registry = *self.registry();
        self.run_bulk(
            "bulk_update",
            &items,
            cancel,
            |item| Some(item.id),
            |draft, item| update_in(draft, &registry, item),
        )
        .await
    }

    /// Deletes many leaf categories. A category whose children are deleted
    /// earlier in the same request can itself be deleted.
    #[tracing::instrument(skip(self, ids, cancel), fields(items = ids.len()))]
    pub async fn bulk_delete(
        &self,
        ids: Vec<CategoryId>,
        cancel: &CancellationToken,
    ) -> Result<BulkReport<Category>> {
        self.run_bulk(
            "bulk_delete",
            &ids,
            cancel,
            |id| Some(*id),
            |draft, id| delete_in(draft, *id),
        )
        .await
    }

    /// Updates SEO metadata (and optionally slugs) of many categories.
    #[tracing::instrument(skip(self, items, cancel), fields(items = items.len()))]
    pub async fn bulk_update_seo(
        &self,
        items: Vec<UpdateSeo>,
        cancel: &CancellationToken,
    ) -> Result<BulkReport<Category>> {
        let registry = *self.registry();
        self.run_bulk(
            "bulk_update_seo",
            &items,
            cancel,
            |item| Some(item.id),
            |draft, item| update_seo_in(draft, &registry, item),
        )
        .await
    }

    fn check_batch(&self, len: usize) -> Result<()> {
        if len == 0 {
            return Err(CategoryError::InvalidBatch(
                "bulk request has no items".to_string(),
            ));
        }
        if len > self.config().bulk_max_items {
            return Err(CategoryError::InvalidBatch(format!(
                "bulk request has {len} items, the limit is {}",
                self.config().bulk_max_items
            )));
        }
        Ok(())
    }

    async fn run_bulk<I, F>(
        &self,
        op: &'static str,
        items: &[I],
        cancel: &CancellationToken,
        id_of: impl Fn(&I) -> Option<CategoryId>,
        apply: F,
    ) -> Result<BulkReport<Category>>
    where
        F: Fn(&mut TreeDraft, &I) -> Result<Category>,
    {
        self.check_batch(items.len())?;
        let chunk_size = self.config().bulk_chunk_size.max(1);
        let mut results = Vec::with_capacity(items.len());

        for (chunk_index, chunk) in items.chunks(chunk_size).enumerate() {
            let base = chunk_index * chunk_size;
            let outcomes: Vec<Result<Category>> = if cancel.is_cancelled() {
                chunk.iter().map(|_| Err(CategoryError::Cancelled)).collect()
            } else {
                self.run_chunk(chunk, &apply).await
            };

            for (offset, (item, outcome)) in chunk.iter().zip(outcomes).enumerate() {
                let id = match &outcome {
                    Ok(category) => Some(category.id),
                    Err(_) => id_of(item),
                };
                results.push(BulkItemResult {
                    index: base + offset,
                    id,
                    outcome,
                });
            }
        }

        let report = BulkReport { results };
        metrics::counter!("category_mutations_total", "op" => op)
            .increment(report.succeeded() as u64);
        metrics::counter!("category_mutation_failures_total", "op" => op)
            .increment(report.failed() as u64);
        tracing::info!(
            op,
            succeeded = report.succeeded(),
            failed = report.failed(),
            cancelled = cancel.is_cancelled(),
            "bulk operation finished"
        );
        Ok(report)
    }

    async fn run_chunk<I, F>(&self, chunk: &[I], apply: &F) -> Vec<Result<Category>>
    where
        F: Fn(&mut TreeDraft, &I) -> Result<Category>,
    {
        let _guard = self.lock_writes().await;
        let snapshot = match self.store().snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                let err = CategoryError::from(err);
                return chunk.iter().map(|_| Err(chunk_failure(&err))).collect();
            }
        };

        let mut draft = TreeDraft::from_snapshot(&snapshot);
        let outcomes: Vec<_> = chunk.iter().map(|item| apply(&mut draft, item)).collect();

        match self.commit_draft(draft).await {
            Ok(_) => outcomes,
            Err(err) => {
                tracing::warn!(error = %err, "bulk chunk commit failed");
                outcomes
                    .into_iter()
                    .map(|outcome| outcome.and_then(|_| Err(chunk_failure(&err))))
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EngineConfig, TreeChange, TreeObserver};
    use category_store::InMemoryCategoryStore;
    use std::sync::Arc;

    /// Cancels the token as soon as anything commits.
    struct CancelOnCommit(CancellationToken);

    impl TreeObserver for CancelOnCommit {
        fn on_tree_change(&self, change: &TreeChange) {
            if matches!(change, TreeChange::Committed { .. }) {
                self.0.cancel();
            }
        }
    }

    fn service(chunk: usize, max: usize) -> CategoryService<InMemoryCategoryStore> {
        CategoryService::with_config(
            InMemoryCategoryStore::new(),
            EngineConfig {
                bulk_chunk_size: chunk,
                bulk_max_items: max,
                ..EngineConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn bulk_create_reports_each_item_in_order() {
        let service = service(2, 10);
        let cancel = CancellationToken::new();
        let report = service
            .bulk_create(
                vec![
                    CreateCategory::root("One"),
                    CreateCategory::root(""),
                    CreateCategory::root("Three"),
                ],
                &cancel,
            )
            .await
            .unwrap();

        assert_eq!(report.len(), 3);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.results[1].index, 1);
        assert!(report.results[1].id.is_none());
        assert!(matches!(
            report.results[1].outcome,
            Err(CategoryError::InvalidField { field: "name", .. })
        ));

        let roots = service.get_roots().await.unwrap();
        let orders: Vec<_> = roots.iter().map(|c| c.sort_order).collect();
        assert_eq!(orders, vec![0, 1]);
    }

    #[tokio::test]
    async fn duplicate_slugs_within_one_batch_conflict() {
        let service = service(10, 10);
        let report = service
            .bulk_create(
                vec![
                    CreateCategory::root("Hats").with_slug("hats"),
                    CreateCategory::root("Caps").with_slug("hats"),
                ],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(report.results[0].is_ok());
        assert!(matches!(
            report.results[1].outcome,
            Err(CategoryError::SlugTaken { .. })
        ));
    }

    #[tokio::test]
    async fn malformed_payloads_are_rejected_up_front() {
        let service = service(2, 2);
        let cancel = CancellationToken::new();
        assert!(matches!(
            service.bulk_delete(vec![], &cancel).await,
            Err(CategoryError::InvalidBatch(_))
        ));
        let ids = vec![CategoryId::new(); 3];
        assert!(matches!(
            service.bulk_delete(ids, &cancel).await,
            Err(CategoryError::InvalidBatch(_))
        ));
    }

    #[tokio::test]
    async fn cancelled_batch_processes_nothing() {
        let service = service(1, 10);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = service
            .bulk_create(
                vec![CreateCategory::root("A"), CreateCategory::root("B")],
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(report.succeeded(), 0);
        assert!(
            report
                .results
                .iter()
                .all(|r| matches!(r.outcome, Err(CategoryError::Cancelled)))
        );
        assert!(service.get_roots().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancellation_between_chunks_keeps_committed_chunks() {
        let service = service(2, 10);
        let cancel = CancellationToken::new();
        service.register_observer(Arc::new(CancelOnCommit(cancel.clone())));

        let items = ["A", "B", "C", "D", "E"]
            .into_iter()
            .map(CreateCategory::root)
            .collect();
        let report = service.bulk_create(items, &cancel).await.unwrap();

        assert_eq!(report.len(), 5);
        assert!(report.results[0].is_ok());
        assert!(report.results[1].is_ok());
        for result in &report.results[2..] {
            assert!(matches!(result.outcome, Err(CategoryError::Cancelled)));
        }

        let roots = service.get_roots().await.unwrap();
        let names: Vec<_> = roots.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(service.snapshot().await.unwrap().version(), 1);
        assert!(service.validate_tree().await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn failed_commit_fails_the_whole_chunk() {
        let store = InMemoryCategoryStore::new();
        let service = CategoryService::new(store.clone());
        store.set_fail_on_commit(true);
        let report = service
            .bulk_create(vec![CreateCategory::root("A")], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.failed(), 1);
        assert_eq!(
            report.results[0].outcome.as_ref().unwrap_err().kind(),
            crate::ErrorKind::Internal
        );
    }
}
