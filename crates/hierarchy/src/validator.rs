//! Whole-tree consistency scan and deterministic self-repair.
//!
//! The scan reports cycles, orphans, stale paths, sort-order gaps, duplicate
//! and malformed slugs. Repair fixes them in three committed phases:
//!
//! 1. structure: orphans and one node per cycle are detached to the root
//!    level, then every path and depth is recomputed from the parent chain;
//! 2. ordering: every sibling group is renumbered to `0..N-1` by
//!    (sort_order, created_at, id);
//! 3. slugs: malformed slugs are regenerated from the name, and in every
//!    group of duplicates all but the earliest-created record get an
//!    alternate; each rename is recorded in slug history.
//!
//! All choices depend only on the stored data, so repairing the same tree
//! twice yields the same result and a second run finds nothing.

use std::collections::{HashMap, HashSet, VecDeque};

use category_store::{Category, CategoryStore, TreeSnapshot};
use common::CategoryId;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::observer::TreeChange;
use crate::service::CategoryService;
use crate::slug::{SlugRegistry, is_valid_slug};
use crate::tree::TreeDraft;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Cycle,
    Orphan,
    PathMismatch,
    SortOrderGap,
    DuplicateSlug,
    MalformedSlug,
}

impl IssueKind {
    pub const ALL: [IssueKind; 6] = [
        IssueKind::Cycle,
        IssueKind::Orphan,
        IssueKind::PathMismatch,
        IssueKind::SortOrderGap,
        IssueKind::DuplicateSlug,
        IssueKind::MalformedSlug,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::Cycle => "cycle",
            IssueKind::Orphan => "orphan",
            IssueKind::PathMismatch => "path_mismatch",
            IssueKind::SortOrderGap => "sort_order_gap",
            IssueKind::DuplicateSlug => "duplicate_slug",
            IssueKind::MalformedSlug => "malformed_slug",
        }
    }
}

/// One inconsistency found by a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub kind: IssueKind,
    /// Categories involved, in a deterministic order.
    pub ids: Vec<CategoryId>,
    pub detail: String,
}

/// Issue counts per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IssueTally {
    pub cycles: usize,
    pub orphans: usize,
    pub path_mismatches: usize,
    pub sort_order_gaps: usize,
    pub duplicate_slugs: usize,
    pub malformed_slugs: usize,
}

impl IssueTally {
    pub fn from_issues(issues: &[Issue]) -> Self {
        let mut tally = Self::default();
        for issue in issues {
            *tally.slot(issue.kind) += 1;
        }
        tally
    }

    fn slot(&mut self, kind: IssueKind) -> &mut usize {
        match kind {
            IssueKind::Cycle => &mut self.cycles,
            IssueKind::Orphan => &mut self.orphans,
            IssueKind::PathMismatch => &mut self.path_mismatches,
            IssueKind::SortOrderGap => &mut self.sort_order_gaps,
            IssueKind::DuplicateSlug => &mut self.duplicate_slugs,
            IssueKind::MalformedSlug => &mut self.malformed_slugs,
        }
    }

    pub fn get(&self, kind: IssueKind) -> usize {
        match kind {
            IssueKind::Cycle => self.cycles,
            IssueKind::Orphan => self.orphans,
            IssueKind::PathMismatch => self.path_mismatches,
            IssueKind::SortOrderGap => self.sort_order_gaps,
            IssueKind::DuplicateSlug => self.duplicate_slugs,
            IssueKind::MalformedSlug => self.malformed_slugs,
        }
    }

    pub fn total(&self) -> usize {
        self.cycles
            + self.orphans
            + self.path_mismatches
            + self.sort_order_gaps
            + self.duplicate_slugs
            + self.malformed_slugs
    }

    /// Per-kind `self - other`, floored at zero.
    fn minus(&self, other: &IssueTally) -> IssueTally {
        IssueTally {
            cycles: self.cycles.saturating_sub(other.cycles),
            orphans: self.orphans.saturating_sub(other.orphans),
            path_mismatches: self.path_mismatches.saturating_sub(other.path_mismatches),
            sort_order_gaps: self.sort_order_gaps.saturating_sub(other.sort_order_gaps),
            duplicate_slugs: self.duplicate_slugs.saturating_sub(other.duplicate_slugs),
            malformed_slugs: self.malformed_slugs.saturating_sub(other.malformed_slugs),
        }
    }
}

/// Result of a read-only scan.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub version: u64,
    pub tally: IssueTally,
    pub issues: Vec<Issue>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn of_kind(&self, kind: IssueKind) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(move |issue| issue.kind == kind)
    }
}

/// An issue repair could not fix.
#[derive(Debug, Clone, Serialize)]
pub struct UnfixableIssue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<IssueKind>,
    pub ids: Vec<CategoryId>,
    pub reason: String,
}

/// Outcome of validate-and-repair.
#[derive(Debug, Clone, Serialize)]
pub struct RepairReport {
    /// Tree version after repair.
    pub version: u64,
    pub found: IssueTally,
    pub fixed: IssueTally,
    pub unfixable: Vec<UnfixableIssue>,
    /// Set when repair stopped early on cancellation.
    pub cancelled: bool,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        self.found.total() == 0 && self.unfixable.is_empty()
    }
}

/// Finds parent cycles by walking parent edges from every node, in the
/// given order, with an on-stack marker. `parent_of` must only return
/// parents that exist. Each cycle is returned once, its members sorted.
fn find_cycles(
    ids: &[CategoryId],
    parent_of: impl Fn(CategoryId) -> Option<CategoryId>,
) -> Vec<Vec<CategoryId>> {
    #[derive(Clone, Copy)]
    enum Mark {
        OnStack,
        Done,
    }

    let mut marks: HashMap<CategoryId, Mark> = HashMap::with_capacity(ids.len());
    let mut cycles = Vec::new();
    for &start in ids {
        let mut stack = Vec::new();
        let mut current = Some(start);
        while let Some(id) = current {
            match marks.get(&id) {
                Some(Mark::Done) => break,
                Some(Mark::OnStack) => {
                    if let Some(position) = stack.iter().position(|s| *s == id) {
                        let mut members = stack[position..].to_vec();
                        members.sort();
                        cycles.push(members);
                    }
                    break;
                }
                None => {
                    marks.insert(id, Mark::OnStack);
                    stack.push(id);
                    current = parent_of(id);
                }
            }
        }
        for id in stack {
            marks.insert(id, Mark::Done);
        }
    }
    cycles
}

fn sorted_ids(snapshot: &TreeSnapshot) -> Vec<CategoryId> {
    let mut ids: Vec<_> = snapshot.iter().map(|c| c.id).collect();
    ids.sort();
    ids
}

fn by_age(a: &&Category, b: &&Category) -> std::cmp::Ordering {
    a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id))
}

/// Scans a snapshot for every kind of inconsistency.
pub fn scan(snapshot: &TreeSnapshot) -> ValidationReport {
    let ids = sorted_ids(snapshot);
    let mut issues = Vec::new();

    let existing_parent = |id: CategoryId| {
        snapshot
            .get(id)
            .and_then(|c| c.parent_id)
            .filter(|parent| snapshot.contains(*parent))
    };
    for members in find_cycles(&ids, existing_parent) {
        issues.push(Issue {
            kind: IssueKind::Cycle,
            detail: format!("{} categories form a parent cycle", members.len()),
            ids: members,
        });
    }

    let mut orphans = Vec::new();
    for id in &ids {
        if let Some(parent) = snapshot.get(*id).and_then(|c| c.parent_id)
            && !snapshot.contains(parent)
        {
            orphans.push(*id);
            issues.push(Issue {
                kind: IssueKind::Orphan,
                ids: vec![*id],
                detail: format!("parent {parent} does not exist"),
            });
        }
    }

    // Expected paths from true roots. Orphans seed with their stored path so
    // their descendants are still checked against them.
    let mut expected: HashMap<CategoryId, Vec<CategoryId>> = HashMap::new();
    let mut queue = VecDeque::new();
    for category in snapshot.roots() {
        expected.insert(category.id, vec![category.id]);
        queue.push_back(category.id);
    }
    for id in &orphans {
        if let Some(category) = snapshot.get(*id) {
            expected.insert(*id, category.path.clone());
            queue.push_back(*id);
        }
    }
    while let Some(id) = queue.pop_front() {
        let base = expected.get(&id).cloned().unwrap_or_default();
        for child in snapshot.child_ids(Some(id)) {
            if expected.contains_key(child) {
                continue;
            }
            let mut path = base.clone();
            path.push(*child);
            expected.insert(*child, path);
            queue.push_back(*child);
        }
    }
    for id in &ids {
        if orphans.contains(id) {
            continue;
        }
        if let (Some(category), Some(path)) = (snapshot.get(*id), expected.get(id))
            && (category.path != *path || category.depth as usize + 1 != path.len())
        {
            issues.push(Issue {
                kind: IssueKind::PathMismatch,
                ids: vec![*id],
                detail: format!(
                    "stored depth {} and path of length {}, expected depth {}",
                    category.depth,
                    category.path.len(),
                    path.len() - 1
                ),
            });
        }
    }

    let mut parents: Vec<_> = snapshot.parent_keys().collect();
    parents.sort();
    for parent in parents {
        let group = snapshot.child_ids(parent);
        let contiguous = group
            .iter()
            .enumerate()
            .all(|(position, id)| snapshot.get(*id).map(|c| c.sort_order) == Some(position as i32));
        if !contiguous {
            let under = parent.map_or_else(|| "the root level".to_string(), |p| p.to_string());
            issues.push(Issue {
                kind: IssueKind::SortOrderGap,
                ids: group.to_vec(),
                detail: format!("sort orders under {under} are not 0..{}", group.len() - 1),
            });
        }
    }

    let mut by_slug: HashMap<&str, Vec<&Category>> = HashMap::new();
    for category in snapshot.iter().filter(|c| c.is_active) {
        by_slug.entry(category.slug.as_str()).or_default().push(category);
    }
    let mut duplicates: Vec<_> = by_slug.into_iter().filter(|(_, g)| g.len() > 1).collect();
    duplicates.sort_by(|a, b| a.0.cmp(b.0));
    for (slug, mut group) in duplicates {
        group.sort_by(by_age);
        issues.push(Issue {
            kind: IssueKind::DuplicateSlug,
            ids: group.iter().map(|c| c.id).collect(),
            detail: format!("{} active categories use slug '{slug}'", group.len()),
        });
    }

    for id in &ids {
        if let Some(category) = snapshot.get(*id)
            && !is_valid_slug(&category.slug)
        {
            issues.push(Issue {
                kind: IssueKind::MalformedSlug,
                ids: vec![*id],
                detail: format!("slug '{}' is not URL-safe", category.slug),
            });
        }
    }

    ValidationReport {
        version: snapshot.version(),
        tally: IssueTally::from_issues(&issues),
        issues,
    }
}

/// Phase 1: detach orphans and broken cycles, then recompute every path.
fn repair_structure(draft: &mut TreeDraft) {
    let ids = draft.ids();
    for id in &ids {
        if let Some(parent) = draft.get(*id).and_then(|c| c.parent_id)
            && !draft.contains(parent)
        {
            draft.set_parent(*id, None);
        }
    }

    let cycles = {
        let view = &*draft;
        find_cycles(&ids, |id| {
            view.get(id)
                .and_then(|c| c.parent_id)
                .filter(|parent| view.contains(*parent))
        })
    };
    for members in cycles {
        let detach = members
            .iter()
            .filter_map(|id| draft.get(*id))
            .max_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.id.cmp(&b.id)))
            .map(|c| c.id);
        if let Some(id) = detach {
            tracing::warn!(%id, members = members.len(), "detaching category to break a cycle");
            draft.set_parent(id, None);
        }
    }

    for root in draft.siblings(None) {
        draft.rebase_subtree(root);
    }
}

/// Phase 2: renumber every sibling group.
fn repair_order(draft: &mut TreeDraft) {
    for parent in draft.parent_keys() {
        draft.normalize_siblings(parent);
    }
}

/// Phase 3: regenerate malformed slugs, then split duplicates.
fn repair_slugs(draft: &mut TreeDraft, registry: &SlugRegistry) {
    let mut records: Vec<(CategoryId, chrono::DateTime<chrono::Utc>)> = draft
        .ids()
        .into_iter()
        .filter_map(|id| draft.get(id).map(|c| (id, c.created_at)))
        .collect();
    records.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));

    for (id, _) in &records {
        let Some(category) = draft.get(*id) else {
            continue;
        };
        if is_valid_slug(&category.slug) {
            continue;
        }
        let name = category.name.clone();
        match registry.first_available(&*draft, &name, Some(*id)) {
            Ok(slug) => draft.rename_slug(*id, &slug),
            Err(err) => tracing::warn!(%id, error = %err, "could not regenerate slug"),
        }
    }

    // Oldest first: the earliest record of each slug claims it, every later
    // one moves to an alternate.
    let mut claimed = HashSet::new();
    for (id, _) in &records {
        let Some(category) = draft.get(*id) else {
            continue;
        };
        if !category.is_active {
            continue;
        }
        let slug = category.slug.clone();
        if claimed.insert(slug.clone()) {
            continue;
        }
        if let Some(alternate) = registry.suggest(&*draft, &slug, Some(*id)).into_iter().next() {
            draft.rename_slug(*id, &alternate);
            claimed.insert(alternate);
        }
    }
}

/// The committed phases of a repair, in order.
#[derive(Debug, Clone, Copy)]
enum RepairPhase {
    Structure,
    Ordering,
    Slugs,
}

impl RepairPhase {
    const ALL: [RepairPhase; 3] = [
        RepairPhase::Structure,
        RepairPhase::Ordering,
        RepairPhase::Slugs,
    ];

    fn name(self) -> &'static str {
        match self {
            RepairPhase::Structure => "structure",
            RepairPhase::Ordering => "ordering",
            RepairPhase::Slugs => "slugs",
        }
    }

    fn apply(self, draft: &mut TreeDraft, registry: &SlugRegistry) {
        match self {
            RepairPhase::Structure => repair_structure(draft),
            RepairPhase::Ordering => repair_order(draft),
            RepairPhase::Slugs => repair_slugs(draft, registry),
        }
    }
}

impl<S: CategoryStore> CategoryService<S> {
    /// Scans the committed tree without changing it.
    #[tracing::instrument(skip(self))]
    pub async fn validate_tree(&self) -> Result<ValidationReport> {
        let snapshot = self.snapshot().await?;
        Ok(scan(&snapshot))
    }

    /// Scans the tree and repairs everything it can.
    ///
    /// Never fails: store errors and leftovers are reported as unfixable.
    /// Cancellation is checked before each phase; phases already committed
    /// stay committed. Observers are told the tree was rebuilt at the end.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn validate_and_repair(&self, cancel: &CancellationToken) -> RepairReport {
        let mut unfixable = Vec::new();
        let mut cancelled = false;

        let before = match self.snapshot().await {
            Ok(snapshot) => scan(&snapshot),
            Err(err) => {
                return RepairReport {
                    version: 0,
                    found: IssueTally::default(),
                    fixed: IssueTally::default(),
                    unfixable: vec![UnfixableIssue {
                        kind: None,
                        ids: Vec::new(),
                        reason: format!("could not read the tree: {err}"),
                    }],
                    cancelled,
                };
            }
        };
        for kind in IssueKind::ALL {
            let count = before.tally.get(kind);
            if count > 0 {
                metrics::counter!("category_repair_issues_total", "kind" => kind.as_str())
                    .increment(count as u64);
            }
        }
        if !before.is_clean() {
            tracing::warn!(issues = before.issues.len(), "category tree has inconsistencies");
        }

        let registry = *self.registry();
        for phase in RepairPhase::ALL {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let _guard = self.lock_writes().await;
            let result = match self.snapshot().await {
                Ok(snapshot) => {
                    let mut draft = TreeDraft::from_snapshot(&snapshot);
                    phase.apply(&mut draft, &registry);
                    self.commit_draft(draft).await
                }
                Err(err) => Err(err),
            };
            match result {
                Ok(Some(version)) => {
                    tracing::info!(phase = phase.name(), version, "repair phase committed")
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(phase = phase.name(), error = %err, "repair phase failed");
                    unfixable.push(UnfixableIssue {
                        kind: None,
                        ids: Vec::new(),
                        reason: format!("{} repair could not be committed: {err}", phase.name()),
                    });
                }
            }
        }

        let (version, after) = match self.snapshot().await {
            Ok(snapshot) => (snapshot.version(), scan(&snapshot)),
            Err(err) => {
                unfixable.push(UnfixableIssue {
                    kind: None,
                    ids: Vec::new(),
                    reason: format!("could not verify the repaired tree: {err}"),
                });
                (before.version, before.clone())
            }
        };
        let reason = if cancelled {
            "repair was cancelled before this issue was fixed"
        } else {
            "still present after repair"
        };
        unfixable.extend(after.issues.iter().map(|issue| UnfixableIssue {
            kind: Some(issue.kind),
            ids: issue.ids.clone(),
            reason: format!("{reason}: {}", issue.detail),
        }));

        self.notify(&TreeChange::Rebuilt { version });

        let report = RepairReport {
            version,
            found: before.tally,
            fixed: before.tally.minus(&after.tally),
            unfixable,
            cancelled,
        };
        tracing::info!(
            found = report.found.total(),
            fixed = report.fixed.total(),
            unfixable = report.unfixable.len(),
            cancelled,
            "tree validation finished"
        );
        report
    }
}
