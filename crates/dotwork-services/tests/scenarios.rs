//! End-to-end service flows over a real store.

use pretty_assertions::assert_eq;

use dotwork_core::audit::AuditLog;
use dotwork_core::id::IdGenerator;
use dotwork_services::{
    BulkService, CreateIssue, DependencyKind, DependencyService, Direction, IssueChanges,
    IssueFilter, IssueService, ListOptions, MergeDisposition, Priority, ProjectService,
    QueryMode, ScopeCache, ScopeFilter, SearchOptions, SearchService, ServiceError, Status,
    Store, UnitOfWork, User,
};

struct Fixture {
    store: Store,
    ids: IdGenerator,
    audit: AuditLog,
    scope_cache: ScopeCache,
}

impl Fixture {
    fn new() -> Self {
        Self {
            store: Store::open_in_memory().unwrap(),
            ids: IdGenerator::default(),
            audit: AuditLog::new(),
            scope_cache: ScopeCache::default(),
        }
    }

    fn uow(&self) -> UnitOfWork {
        self.store.unit_of_work().unwrap()
    }

    fn issues<'a>(&'a self, uow: &'a UnitOfWork) -> IssueService<'a> {
        IssueService::new(uow, &self.ids, Some(&self.audit))
    }

    fn deps<'a>(&'a self, uow: &'a UnitOfWork) -> DependencyService<'a> {
        DependencyService::new(uow, &self.scope_cache)
    }
}

fn titled(title: &str) -> CreateIssue {
    CreateIssue {
        title: title.into(),
        ..Default::default()
    }
}

#[test]
fn create_project_and_issue_then_list_by_status() {
    let fx = Fixture::new();
    let uow = fx.uow();
    let projects = ProjectService::new(&uow, &fx.ids, Some(&fx.audit));
    let issues = fx.issues(&uow);
    let user = User::new("alice");

    let project = projects.create_project("alpha", "", Some(&user)).unwrap();

    let created = issues
        .create_issue(
            CreateIssue {
                title: "T1".into(),
                priority: Priority::High,
                project_id: Some(project.id.clone()),
                ..Default::default()
            },
            Some(&user),
        )
        .unwrap();

    let filter = IssueFilter {
        status: Some(Status::Proposed),
        ..Default::default()
    };
    let listed = issues
        .list_issues(&filter, &ListOptions::with_limit(10))
        .unwrap();

    assert_eq!(listed.len(), 1);
    let issue = &listed[0];
    assert_eq!(issue.id, created.id);
    assert!(issue.id.has_prefix("issue"));
    assert_eq!(issue.id.short().len(), 8);
    assert_eq!(issue.updated_at, issue.created_at);
    assert_eq!(issue.project_id, Some(project.id.clone()));
}

#[test]
fn dependency_cycle_is_rejected_and_graph_unchanged() {
    let fx = Fixture::new();
    let uow = fx.uow();
    let issues = fx.issues(&uow);
    let deps = fx.deps(&uow);

    let a = issues.create_issue(titled("A"), None).unwrap();
    let b = issues.create_issue(titled("B"), None).unwrap();
    let c = issues.create_issue(titled("C"), None).unwrap();

    deps.add_dependency(&a.id, &b.id, DependencyKind::Blocks)
        .unwrap();
    deps.add_dependency(&b.id, &c.id, DependencyKind::Blocks)
        .unwrap();

    let err = deps
        .add_dependency(&c.id, &a.id, DependencyKind::Blocks)
        .unwrap_err();
    assert!(matches!(err, ServiceError::Cycle));

    // Graph unchanged: a still has exactly one outgoing edge, c none.
    let out_a = deps.list_for(&a.id, Direction::Out).unwrap();
    assert_eq!(out_a.len(), 1);
    let out_c = deps.list_for(&c.id, Direction::Out).unwrap();
    assert!(out_c.is_empty());
    assert!(deps.detect_cycles().unwrap().is_empty());
}

#[test]
fn set_labels_drops_duplicates_and_keeps_order() {
    let fx = Fixture::new();
    let uow = fx.uow();
    let issues = fx.issues(&uow);

    let issue = issues.create_issue(titled("Labelled"), None).unwrap();
    let issue = issues
        .set_labels(
            &issue.id,
            vec!["bug".into(), "ui".into(), "bug".into()],
            None,
        )
        .unwrap();
    assert_eq!(issue.labels, vec!["bug", "ui"]);

    // Survives a reload through the store.
    let stored = issues.get_issue(&issue.id).unwrap();
    assert_eq!(stored.labels, vec!["bug", "ui"]);
}

#[test]
fn merge_unions_labels_copies_comments_and_remaps_edges() {
    let fx = Fixture::new();
    let uow = fx.uow();
    let issues = fx.issues(&uow);
    let deps = fx.deps(&uow);
    let user = User::new("alice");

    let source = issues
        .create_issue(
            CreateIssue {
                title: "S".into(),
                labels: vec!["x".into(), "y".into()],
                ..Default::default()
            },
            None,
        )
        .unwrap();
    let target = issues
        .create_issue(
            CreateIssue {
                title: "D".into(),
                labels: vec!["y".into(), "z".into()],
                ..Default::default()
            },
            None,
        )
        .unwrap();
    let other = issues.create_issue(titled("T2"), None).unwrap();

    issues
        .add_comment(&source.id, "bob", "first note", None)
        .unwrap();
    issues
        .add_comment(&source.id, "carol", "second note", None)
        .unwrap();
    deps.add_dependency(&source.id, &other.id, DependencyKind::Blocks)
        .unwrap();

    let outcome = issues
        .merge_issues(&source.id, &target.id, MergeDisposition::Close, Some(&user))
        .unwrap();

    // Labels: target order preserved, then source's new labels.
    assert_eq!(outcome.target.labels, vec!["y", "z", "x"]);

    // Comments copied with the merge marker, timestamps preserved.
    let copied = issues.list_comments(&target.id).unwrap();
    assert_eq!(copied.len(), 2);
    assert!(copied[0].body.starts_with(&format!("[merged from {}]", source.id)));

    // Edge S -> T2 became D -> T2.
    let out = deps.list_for(&target.id, Direction::Out).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].to_issue_id, other.id);
    let source_out = uow
        .dependencies()
        .list_for(&source.id, Direction::Both)
        .unwrap();
    assert!(source_out.is_empty());

    // Source closed with a reason referencing the target.
    let closed_source = outcome.source.unwrap();
    assert_eq!(closed_source.status, Status::Closed);
    assert!(closed_source
        .blocked_reason
        .as_deref()
        .unwrap()
        .contains(target.id.as_str()));

    // Audit entries for both sides.
    let merges = fx
        .audit
        .entries()
        .iter()
        .filter(|e| e.action == dotwork_services::AuditAction::Merge)
        .count();
    assert_eq!(merges, 2);
}

#[test]
fn repeated_merge_is_stable_on_labels_and_comments() {
    let fx = Fixture::new();
    let uow = fx.uow();
    let issues = fx.issues(&uow);

    let source = issues
        .create_issue(
            CreateIssue {
                title: "Source".into(),
                labels: vec!["x".into()],
                ..Default::default()
            },
            None,
        )
        .unwrap();
    issues
        .add_comment(&source.id, "bob", "only once", None)
        .unwrap();
    let target = issues
        .create_issue(
            CreateIssue {
                title: "Target".into(),
                labels: vec!["y".into()],
                ..Default::default()
            },
            None,
        )
        .unwrap();

    issues
        .merge_issues(&source.id, &target.id, MergeDisposition::Close, None)
        .unwrap();
    let second = issues
        .merge_issues(&source.id, &target.id, MergeDisposition::Close, None)
        .unwrap();

    assert_eq!(second.target.labels, vec!["y", "x"]);
    assert_eq!(issues.list_comments(&target.id).unwrap().len(), 1);
}

#[test]
fn merge_with_delete_disposition_removes_source() {
    let fx = Fixture::new();
    let uow = fx.uow();
    let issues = fx.issues(&uow);

    let source = issues.create_issue(titled("Source"), None).unwrap();
    issues
        .add_comment(&source.id, "bob", "left behind", None)
        .unwrap();
    let target = issues.create_issue(titled("Target"), None).unwrap();

    let outcome = issues
        .merge_issues(&source.id, &target.id, MergeDisposition::Delete, None)
        .unwrap();
    assert!(outcome.source.is_none());
    assert!(issues.get_issue(&source.id).unwrap_err().is_not_found());
    // The copy survives on the target; the original cascaded away.
    assert_eq!(issues.list_comments(&target.id).unwrap().len(), 1);
}

#[test]
fn bulk_create_with_one_bad_input_commits_nothing() {
    let fx = Fixture::new();
    let uow = fx.uow();
    let bulk = BulkService::new(&uow, &fx.ids, Some(&fx.audit));

    let mut inputs: Vec<CreateIssue> = (0..100).map(|i| titled(&format!("Task {i}"))).collect();
    inputs[17].title = String::new();

    let result = bulk.bulk_create(inputs, Some(&User::new("alice"))).unwrap();
    assert_eq!(result.total, 100);
    assert_eq!(result.succeeded, 0);
    assert_eq!(result.failed, 100);
    assert_eq!(result.errors, vec![("17".to_owned(), "validation error: title required".to_owned())]);

    let listed = uow
        .issues()
        .list(&IssueFilter::default(), &ListOptions::with_limit(1000))
        .unwrap();
    assert!(listed.is_empty());
    assert!(fx.audit.is_empty());
}

#[test]
fn bulk_create_performance_shape_thousand_rows() {
    let fx = Fixture::new();
    let uow = fx.uow();
    let bulk = BulkService::new(&uow, &fx.ids, None);

    let inputs: Vec<CreateIssue> = (0..1000).map(|i| titled(&format!("Load {i}"))).collect();
    let before = uow.queries_executed();
    let result = bulk.bulk_create(inputs, None).unwrap();
    assert_eq!(result.succeeded, 1000);

    // One insert statement for the rows, one for the FTS rows, plus the
    // 1000 collision probes from id allocation... none of which happen in
    // bulk: translation does not touch the store, so the whole batch is a
    // handful of statements.
    assert!(
        uow.queries_executed() - before < 10,
        "bulk create must not issue per-row statements"
    );
}

#[test]
fn sanitizer_rejects_injection_before_touching_the_store() {
    let fx = Fixture::new();
    let uow = fx.uow();
    let search = SearchService::new(&uow, &fx.scope_cache);

    let before = uow.queries_executed();
    let err = search
        .search("payment -- DROP TABLE", &SearchOptions::default())
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidQuery(_)));
    assert_eq!(uow.queries_executed(), before);
}

#[test]
fn search_finds_whole_word_matches_within_scope() {
    let fx = Fixture::new();
    let uow = fx.uow();
    let projects = ProjectService::new(&uow, &fx.ids, None);
    let issues = fx.issues(&uow);
    let search = SearchService::new(&uow, &fx.scope_cache);

    let project = projects.create_project("payments", "", None).unwrap();
    let in_scope = issues
        .create_issue(
            CreateIssue {
                title: "Payment gateway timeout".into(),
                project_id: Some(project.id.clone()),
                ..Default::default()
            },
            None,
        )
        .unwrap();
    let out_of_scope = issues
        .create_issue(titled("Payment audit checklist"), None)
        .unwrap();

    // Unrestricted scope sees both.
    let hits = search.search("payment", &SearchOptions::default()).unwrap();
    assert_eq!(hits.len(), 2);

    // Project scope hides the shared issue.
    let scoped = SearchOptions {
        scope: ScopeFilter {
            project: Some(project.id.clone()),
            ..Default::default()
        },
        ..Default::default()
    };
    let hits = search.search("payment", &scoped).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].issue.id, in_scope.id);
    assert_ne!(hits[0].issue.id, out_of_scope.id);
}

#[test]
fn advanced_mode_is_opt_in() {
    let fx = Fixture::new();
    let uow = fx.uow();
    let issues = fx.issues(&uow);
    let search = SearchService::new(&uow, &fx.scope_cache);

    issues
        .create_issue(titled("Alpha release checklist"), None)
        .unwrap();

    // Grouping fails in simple mode...
    let err = search
        .search("(alpha OR beta)", &SearchOptions::default())
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidQuery(_)));

    // ...and works in advanced mode.
    let advanced = SearchOptions {
        mode: QueryMode::Advanced,
        ..Default::default()
    };
    let hits = search.search("(alpha OR beta)", &advanced).unwrap();
    assert_eq!(hits.len(), 1);
}

#[test]
fn update_routes_status_through_the_state_machine() {
    let fx = Fixture::new();
    let uow = fx.uow();
    let issues = fx.issues(&uow);

    let issue = issues.create_issue(titled("Guarded"), None).unwrap();

    // proposed -> completed is not reachable directly.
    let err = issues
        .update_issue(
            &issue.id,
            &IssueChanges {
                status: Some(Status::Completed),
                ..Default::default()
            },
            None,
        )
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidTransition { .. }));

    // Through in_progress it is.
    issues
        .transition(&issue.id, Status::InProgress, None)
        .unwrap();
    let done = issues
        .update_issue(
            &issue.id,
            &IssueChanges {
                status: Some(Status::Completed),
                ..Default::default()
            },
            None,
        )
        .unwrap();
    assert!(done.closed_at.is_some());
}

#[test]
fn committed_state_survives_reopen_of_a_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("issues.db");
    let ids = IdGenerator::default();

    let created_id = {
        let store = Store::open(&path).unwrap();
        let mut uow = store.unit_of_work().unwrap();
        let issues = IssueService::new(&uow, &ids, None);
        let issue = issues.create_issue(titled("Durable"), None).unwrap();
        uow.commit().unwrap();
        issue.id
    };

    let store = Store::open(&path).unwrap();
    let uow = store.unit_of_work().unwrap();
    let got = uow.issues().get(&created_id).unwrap();
    assert_eq!(got.title, "Durable");
}
