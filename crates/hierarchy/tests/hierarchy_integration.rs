//! Integration tests for the category engine.
//!
//! These tests drive the service end to end against the in-memory store and
//! check the tree invariants after every mutation sequence.

use std::sync::Arc;

use category_store::{Category, CategoryId, CategoryStore, InMemoryCategoryStore};
use chrono::{Duration, Utc};
use hierarchy::{
    CancellationToken, CategoryError, CategoryService, CreateCategory, ErrorKind, IssueKind,
    MoveCategory, ReorderCategories, ReorderItem, TreeChange, TreeObserver, UpdateCategory, scan,
};

/// Helper to create a test category service
fn create_service() -> CategoryService<InMemoryCategoryStore> {
    CategoryService::new(InMemoryCategoryStore::new())
}

async fn create(
    service: &CategoryService<InMemoryCategoryStore>,
    parent: Option<CategoryId>,
    name: &str,
) -> Category {
    let cmd = match parent {
        Some(parent) => CreateCategory::child(parent, name),
        None => CreateCategory::root(name),
    };
    service.create_category(cmd).await.unwrap()
}

async fn version(service: &CategoryService<InMemoryCategoryStore>) -> u64 {
    service.store().snapshot().await.unwrap().version()
}

/// Asserts every structural invariant on the committed tree.
async fn assert_consistent(service: &CategoryService<InMemoryCategoryStore>) {
    let report = service.validate_tree().await.unwrap();
    assert!(report.is_clean(), "tree has issues: {:?}", report.issues);
}

mod paths {
    use super::*;

    #[tokio::test]
    async fn depth_and_path_follow_parent_chain() {
        let service = create_service();
        let a = create(&service, None, "A").await;
        let b = create(&service, Some(a.id), "B").await;
        let c = create(&service, Some(b.id), "C").await;

        assert_eq!(a.depth, 0);
        assert_eq!(b.depth, 1);
        assert_eq!(c.depth, 2);
        assert_eq!(c.path, vec![a.id, b.id, c.id]);

        let breadcrumb: Vec<_> = service
            .get_path(c.id)
            .await
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(breadcrumb, c.path);
        assert_consistent(&service).await;
    }

    #[tokio::test]
    async fn move_rewrites_every_descendant() {
        let service = create_service();
        let a = create(&service, None, "A").await;
        let b = create(&service, Some(a.id), "B").await;
        let c = create(&service, Some(b.id), "C").await;
        let d = create(&service, Some(c.id), "D").await;
        let other = create(&service, None, "Other").await;
        let deep = create(&service, Some(other.id), "Deep").await;

        service
            .move_category(MoveCategory::under(b.id, deep.id))
            .await
            .unwrap();

        let d = service.get_category(d.id).await.unwrap();
        assert_eq!(d.path, vec![other.id, deep.id, b.id, c.id, d.id]);
        assert_eq!(d.depth, 4);
        assert!(service.get_children(a.id).await.unwrap().is_empty());
        assert_consistent(&service).await;
    }

    #[tokio::test]
    async fn random_move_sequence_keeps_invariants() {
        let service = create_service();
        let mut ids = Vec::new();
        for i in 0..12 {
            let parent = if i < 3 { None } else { Some(ids[i % 3]) };
            ids.push(create(&service, parent, &format!("Node {i}")).await.id);
        }

        // Deterministic pseudo-random walk; cycles are rejected and skipped.
        let mut seed = 17usize;
        for _ in 0..40 {
            seed = (seed * 31 + 7) % 101;
            let id = ids[seed % ids.len()];
            let target = ids[(seed / 3) % ids.len()];
            let cmd = if seed % 5 == 0 {
                MoveCategory::to_root(id)
            } else {
                MoveCategory::under(id, target)
            };
            match service.move_category(cmd).await {
                Ok(_) => {}
                Err(err) => assert!(matches!(
                    err,
                    CategoryError::Cycle { .. } | CategoryError::SelfParent(_)
                )),
            }
        }
        assert_consistent(&service).await;
    }
}

mod moves {
    use super::*;

    #[tokio::test]
    async fn chain_scenario() {
        let service = create_service();
        let a = create(&service, None, "A").await;
        let b = create(&service, Some(a.id), "B").await;
        let c = create(&service, Some(b.id), "C").await;
        let before = version(&service).await;

        let err = service
            .move_category(MoveCategory::under(a.id, c.id))
            .await
            .unwrap_err();
        assert!(matches!(err, CategoryError::Cycle { id, new_parent } if id == a.id && new_parent == c.id));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(version(&service).await, before);

        let moved = service
            .move_category(MoveCategory::to_root(c.id))
            .await
            .unwrap();
        assert_eq!(moved.depth, 0);
        assert_eq!(moved.path, vec![c.id]);
        assert_eq!(moved.sort_order, 1);
        assert_consistent(&service).await;
    }

    #[tokio::test]
    async fn self_parent_is_invalid() {
        let service = create_service();
        let a = create(&service, None, "A").await;
        let err = service
            .move_category(MoveCategory::under(a.id, a.id))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn missing_parent_and_node_are_not_found() {
        let service = create_service();
        let a = create(&service, None, "A").await;
        let missing = CategoryId::new();
        assert!(matches!(
            service.move_category(MoveCategory::under(a.id, missing)).await,
            Err(CategoryError::ParentNotFound(_))
        ));
        assert!(matches!(
            service.move_category(MoveCategory::to_root(missing)).await,
            Err(CategoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn move_closes_gap_and_appends() {
        let service = create_service();
        let root = create(&service, None, "Root").await;
        let first = create(&service, Some(root.id), "First").await;
        let second = create(&service, Some(root.id), "Second").await;
        let third = create(&service, Some(root.id), "Third").await;
        let target = create(&service, None, "Target").await;
        create(&service, Some(target.id), "Existing").await;

        let moved = service
            .move_category(MoveCategory::under(first.id, target.id))
            .await
            .unwrap();
        assert_eq!(moved.sort_order, 1);

        let remaining: Vec<_> = service
            .get_children(root.id)
            .await
            .unwrap()
            .iter()
            .map(|c| (c.id, c.sort_order))
            .collect();
        assert_eq!(remaining, vec![(second.id, 0), (third.id, 1)]);
        assert_consistent(&service).await;
    }
}

mod reorder {
    use super::*;

    #[tokio::test]
    async fn reorder_is_contiguous_and_idempotent() {
        let service = create_service();
        let root = create(&service, None, "Root").await;
        let mut ids = Vec::new();
        for name in ["a", "b", "c", "d"] {
            ids.push(create(&service, Some(root.id), name).await.id);
        }
        let cmd = ReorderCategories::new(vec![
            ReorderItem {
                id: ids[3],
                target_order: 0,
            },
            ReorderItem {
                id: ids[0],
                target_order: 2,
            },
        ]);

        let group = service.reorder_categories(cmd.clone()).await.unwrap();
        let order: Vec<_> = group.iter().map(|c| c.id).collect();
        assert_eq!(order, vec![ids[3], ids[1], ids[0], ids[2]]);
        let sort_orders: Vec<_> = group.iter().map(|c| c.sort_order).collect();
        assert_eq!(sort_orders, vec![0, 1, 2, 3]);

        let before = version(&service).await;
        service.reorder_categories(cmd).await.unwrap();
        assert_eq!(version(&service).await, before);
        assert_consistent(&service).await;
    }

    #[tokio::test]
    async fn reorder_across_parents_is_rejected() {
        let service = create_service();
        let a = create(&service, None, "A").await;
        let b = create(&service, None, "B").await;
        let child = create(&service, Some(a.id), "Child").await;

        let err = service
            .reorder_categories(ReorderCategories::in_order(&[b.id, child.id]))
            .await
            .unwrap_err();
        assert!(matches!(err, CategoryError::MixedParents { .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = service
            .reorder_categories(ReorderCategories::in_order(&[a.id, CategoryId::new()]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn full_reorder_of_roots() {
        let service = create_service();
        let a = create(&service, None, "A").await;
        let b = create(&service, None, "B").await;
        let c = create(&service, None, "C").await;

        service
            .reorder_categories(ReorderCategories::in_order(&[c.id, a.id, b.id]))
            .await
            .unwrap();
        let roots: Vec<_> = service
            .get_roots()
            .await
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(roots, vec![c.id, a.id, b.id]);
    }
}

mod slugs {
    use super::*;

    #[tokio::test]
    async fn duplicate_slug_on_create_conflicts() {
        let service = create_service();
        create(&service, None, "Shoes").await;
        let err = service
            .create_category(CreateCategory::root("Sneakers").with_slug("shoes"))
            .await
            .unwrap_err();
        match err {
            CategoryError::SlugTaken { suggestions, .. } => {
                assert_eq!(suggestions.first().map(String::as_str), Some("shoes-2"));
            }
            other => panic!("expected SlugTaken, got {other:?}"),
        }

        // Derived slugs fall back to a suggestion instead of failing.
        let derived = create(&service, None, "Shoes").await;
        assert_eq!(derived.slug, "shoes-2");
    }

    #[tokio::test]
    async fn rename_records_history_and_redirects() {
        let service = create_service();
        let shoes = create(&service, None, "Shoes").await;
        service
            .update_category(UpdateCategory::new(shoes.id).slug("footwear"))
            .await
            .unwrap();

        let history = service.slug_history(shoes.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].old_slug, "shoes");
        assert_eq!(history[0].new_slug, "footwear");

        let resolved = service.get_by_slug("shoes").await.unwrap();
        assert_eq!(resolved.category.id, shoes.id);
        assert_eq!(resolved.redirected_from.as_deref(), Some("shoes"));
        assert!(!service.get_by_slug("footwear").await.unwrap().is_redirect());

        // The old slug stays reserved for redirects...
        let err = service
            .create_category(CreateCategory::root("Other").with_slug("shoes"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        // ...but its owner may take it back.
        let back = service
            .update_category(UpdateCategory::new(shoes.id).slug("shoes"))
            .await
            .unwrap();
        assert_eq!(back.slug, "shoes");
        assert_eq!(service.slug_history(shoes.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn update_to_taken_slug_conflicts() {
        let service = create_service();
        create(&service, None, "Hats").await;
        let caps = create(&service, None, "Caps").await;
        let err = service
            .update_category(UpdateCategory::new(caps.id).slug("hats"))
            .await
            .unwrap_err();
        assert!(matches!(err, CategoryError::SlugTaken { .. }));
        assert_eq!(service.get_category(caps.id).await.unwrap().slug, "caps");
    }

    #[tokio::test]
    async fn malformed_slug_is_invalid() {
        let service = create_service();
        let err = service
            .create_category(CreateCategory::root("Bags").with_slug("Bags & More"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn reactivation_rechecks_slug() {
        let service = create_service();
        let lamp = service
            .create_category(CreateCategory::root("Lamp").inactive())
            .await
            .unwrap();
        service
            .create_category(CreateCategory::root("Lamps").with_slug("lamp"))
            .await
            .unwrap();

        let err = service
            .update_category(UpdateCategory::new(lamp.id).active(true))
            .await
            .unwrap_err();
        assert!(matches!(err, CategoryError::SlugTaken { .. }));
    }

    #[tokio::test]
    async fn deleted_slug_is_released() {
        let service = create_service();
        let temp = create(&service, None, "Temp").await;
        service.delete_category(temp.id).await.unwrap();
        let again = create(&service, None, "Temp").await;
        assert_eq!(again.slug, "temp");
    }

    #[tokio::test]
    async fn generate_and_validate() {
        let service = create_service();
        create(&service, None, "Kids Toys").await;
        assert_eq!(
            service.generate_slug("Kids' Toys", None).await.unwrap(),
            "kids-toys-2"
        );
        let report = service.validate_slug("kids-toys", None).await.unwrap();
        assert!(!report.available);
        assert!(!report.suggestions.is_empty());
    }
}

mod delete {
    use super::*;

    #[tokio::test]
    async fn node_with_children_is_rejected() {
        let service = create_service();
        let parent = create(&service, None, "Parent").await;
        create(&service, Some(parent.id), "Child").await;
        let err = service.delete_category(parent.id).await.unwrap_err();
        assert!(matches!(err, CategoryError::HasChildren { children: 1, .. }));
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn delete_closes_sibling_gap() {
        let service = create_service();
        let a = create(&service, None, "A").await;
        let b = create(&service, None, "B").await;
        let c = create(&service, None, "C").await;
        service.delete_category(b.id).await.unwrap();

        let roots: Vec<_> = service
            .get_roots()
            .await
            .unwrap()
            .iter()
            .map(|c| (c.id, c.sort_order))
            .collect();
        assert_eq!(roots, vec![(a.id, 0), (c.id, 1)]);
    }

    #[tokio::test]
    async fn bulk_delete_reports_per_item() {
        let service = create_service();
        let x = create(&service, None, "X").await;
        create(&service, Some(x.id), "X child").await;
        let y = create(&service, None, "Y").await;

        let report = service
            .bulk_delete(vec![x.id, y.id], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.len(), 2);
        assert_eq!(
            report.results[0].outcome.as_ref().unwrap_err().kind(),
            ErrorKind::Conflict
        );
        assert_eq!(report.results[0].id, Some(x.id));
        assert!(report.results[1].is_ok());
        assert!(matches!(
            service.get_category(y.id).await,
            Err(CategoryError::NotFound(_))
        ));
        assert!(service.get_category(x.id).await.is_ok());
    }
}

mod repair {
    use super::*;

    /// Cancels the token after the first committed phase.
    struct CancelOnCommit(CancellationToken);

    impl TreeObserver for CancelOnCommit {
        fn on_tree_change(&self, change: &TreeChange) {
            if matches!(change, TreeChange::Committed { .. }) {
                self.0.cancel();
            }
        }
    }

    struct Corrupted {
        store: InMemoryCategoryStore,
        root: Category,
        stale: Category,
        orphan: Category,
        older_in_cycle: Category,
        newer_in_cycle: Category,
        first_dup: Category,
        second_dup: Category,
        bad: Category,
    }

    fn corrupted() -> Corrupted {
        let now = Utc::now();
        let earlier = now - Duration::minutes(10);

        let root = Category::builder()
            .name("Root")
            .slug("root")
            .sort_order(3)
            .created_at(earlier)
            .build();
        let stale = Category::builder()
            .parent_id(Some(root.id))
            .name("Stale")
            .slug("stale")
            .depth(5)
            .build();
        let orphan = Category::builder()
            .parent_id(Some(CategoryId::new()))
            .name("Orphan")
            .slug("orphan")
            .build();

        let p_id = CategoryId::new();
        let q_id = CategoryId::new();
        let older_in_cycle = Category::builder()
            .id(p_id)
            .parent_id(Some(q_id))
            .name("P")
            .created_at(earlier)
            .updated_at(earlier)
            .build();
        let newer_in_cycle = Category::builder()
            .id(q_id)
            .parent_id(Some(p_id))
            .name("Q")
            .created_at(earlier)
            .updated_at(now)
            .build();

        let first_dup = Category::builder()
            .name("Dup")
            .slug("dup")
            .created_at(earlier)
            .build();
        let second_dup = Category::builder()
            .name("Dup")
            .slug("dup")
            .sort_order(7)
            .created_at(now)
            .build();
        let bad = Category::builder()
            .name("Bad Slug")
            .slug("Bad Slug!!")
            .sort_order(1)
            .build();

        let store = InMemoryCategoryStore::with_records(
            vec![
                root.clone(),
                stale.clone(),
                orphan.clone(),
                older_in_cycle.clone(),
                newer_in_cycle.clone(),
                first_dup.clone(),
                second_dup.clone(),
                bad.clone(),
            ],
            vec![],
        );
        Corrupted {
            store,
            root,
            stale,
            orphan,
            older_in_cycle,
            newer_in_cycle,
            first_dup,
            second_dup,
            bad,
        }
    }

    #[tokio::test]
    async fn scan_finds_every_kind() {
        let fixture = corrupted();
        let snapshot = fixture.store.snapshot().await.unwrap();
        let report = scan(&snapshot);
        for kind in IssueKind::ALL {
            assert!(
                report.of_kind(kind).next().is_some(),
                "expected a {kind:?} issue"
            );
        }
    }

    #[tokio::test]
    async fn repair_fixes_everything_deterministically() {
        let fixture = corrupted();
        let service = CategoryService::new(fixture.store.clone());
        let report = service
            .validate_and_repair(&CancellationToken::new())
            .await;

        assert_eq!(report.found.cycles, 1);
        assert_eq!(report.found.orphans, 1);
        assert_eq!(report.found.duplicate_slugs, 1);
        assert_eq!(report.found.malformed_slugs, 1);
        assert!(report.found.path_mismatches >= 1);
        assert_eq!(report.fixed, report.found);
        assert!(report.unfixable.is_empty(), "{:?}", report.unfixable);
        assert!(!report.cancelled);

        let get = |id| service.get_category(id);
        let orphan = get(fixture.orphan.id).await.unwrap();
        assert!(orphan.is_root());
        assert_eq!(orphan.path, vec![orphan.id]);

        let detached = get(fixture.newer_in_cycle.id).await.unwrap();
        assert!(detached.is_root());
        let kept = get(fixture.older_in_cycle.id).await.unwrap();
        assert_eq!(kept.path, vec![detached.id, kept.id]);
        assert_eq!(kept.depth, 1);

        let stale = get(fixture.stale.id).await.unwrap();
        assert_eq!(stale.depth, 1);
        assert_eq!(stale.path, vec![fixture.root.id, stale.id]);

        assert_eq!(get(fixture.first_dup.id).await.unwrap().slug, "dup");
        assert_eq!(get(fixture.second_dup.id).await.unwrap().slug, "dup-2");
        assert_eq!(get(fixture.bad.id).await.unwrap().slug, "bad-slug");
        assert_eq!(
            service.slug_history(fixture.second_dup.id).await.unwrap()[0].old_slug,
            "dup"
        );

        let orders: Vec<_> = service
            .get_roots()
            .await
            .unwrap()
            .iter()
            .map(|c| c.sort_order)
            .collect();
        assert_eq!(orders, (0..orders.len() as i32).collect::<Vec<_>>());
        assert_consistent(&service).await;
    }

    #[tokio::test]
    async fn second_repair_finds_nothing() {
        let fixture = corrupted();
        let service = CategoryService::new(fixture.store.clone());
        let cancel = CancellationToken::new();
        service.validate_and_repair(&cancel).await;
        let version_after_first = version(&service).await;

        let second = service.validate_and_repair(&cancel).await;
        assert_eq!(second.found.total(), 0);
        assert!(second.is_clean());
        assert_eq!(second.version, version_after_first);
    }

    #[tokio::test]
    async fn cancelled_repair_changes_nothing() {
        let fixture = corrupted();
        let service = CategoryService::new(fixture.store.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = service.validate_and_repair(&cancel).await;
        assert!(report.cancelled);
        assert!(report.found.total() > 0);
        assert_eq!(report.fixed.total(), 0);
        assert_eq!(report.unfixable.len(), report.found.total());
        assert_eq!(version(&service).await, 0);
    }

    #[tokio::test]
    async fn cancellation_between_phases_keeps_committed_phase() {
        let fixture = corrupted();
        let service = CategoryService::new(fixture.store.clone());
        let cancel = CancellationToken::new();
        service.register_observer(Arc::new(CancelOnCommit(cancel.clone())));

        let report = service.validate_and_repair(&cancel).await;
        assert!(report.cancelled);
        assert_eq!(report.version, 1);

        // The structure phase committed before cancellation.
        assert_eq!(report.fixed.cycles, 1);
        assert_eq!(report.fixed.orphans, 1);
        assert_eq!(report.fixed.path_mismatches, report.found.path_mismatches);
        assert!(service.get_category(fixture.orphan.id).await.unwrap().is_root());
        assert!(
            service
                .get_category(fixture.newer_in_cycle.id)
                .await
                .unwrap()
                .is_root()
        );

        // The slug phase never ran.
        assert_eq!(report.fixed.duplicate_slugs, 0);
        assert_eq!(report.fixed.malformed_slugs, 0);
        assert_eq!(
            service.get_category(fixture.second_dup.id).await.unwrap().slug,
            "dup"
        );
        assert_eq!(
            service.get_category(fixture.bad.id).await.unwrap().slug,
            "Bad Slug!!"
        );
        assert!(
            report
                .unfixable
                .iter()
                .any(|issue| issue.kind == Some(IssueKind::DuplicateSlug)
                    && issue.reason.contains("cancelled"))
        );

        let rest = service.validate_and_repair(&CancellationToken::new()).await;
        assert!(!rest.cancelled);
        assert!(rest.unfixable.is_empty(), "{:?}", rest.unfixable);
        assert_consistent(&service).await;
    }

    #[tokio::test]
    async fn failed_commit_is_reported_not_raised() {
        let fixture = corrupted();
        let service = CategoryService::new(fixture.store.clone());
        fixture.store.set_fail_on_commit(true);

        let report = service
            .validate_and_repair(&CancellationToken::new())
            .await;
        assert_eq!(report.fixed.total(), 0);
        assert!(
            report
                .unfixable
                .iter()
                .any(|issue| issue.kind.is_none() && issue.reason.contains("could not be committed"))
        );
    }
}

mod concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creates_keep_contiguous_orders() {
        let service = Arc::new(create_service());
        let root_id = create(&service, None, "Root").await.id;

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    service
                        .create_category(CreateCategory::child(root_id, format!("Child {i}")))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let orders: Vec<_> = service
            .get_children(root_id)
            .await
            .unwrap()
            .iter()
            .map(|c| c.sort_order)
            .collect();
        assert_eq!(orders, (0..20).collect::<Vec<_>>());
        assert_consistent(&service).await;
    }

    #[tokio::test]
    async fn readers_keep_their_snapshot() {
        let service = create_service();
        let a = create(&service, None, "A").await;
        let before = service.snapshot().await.unwrap();
        service.delete_category(a.id).await.unwrap();
        assert!(before.contains(a.id));
        assert!(!service.snapshot().await.unwrap().contains(a.id));
    }
}
