use workgate::errors::WorkgateError;
use workgate::tracker::{
    Dependency, DependencyKind, Issue, IssueFields, IssueTracker, MemoryTracker, TrackerSnapshot,
};
use workgate::types::{SizeMetrics, SourceState};

#[tokio::test]
async fn created_issues_form_a_tree() {
    let tracker = MemoryTracker::new();
    let epic = tracker.create_issue("Checkout", "", None).await.unwrap();
    let first = tracker
        .create_issue("Cart totals", "sum line items", Some(&epic))
        .await
        .unwrap();
    let second = tracker
        .create_issue("Payment form", "", Some(&epic))
        .await
        .unwrap();
    assert_eq!(epic, "ISSUE-1");
    assert_eq!(first, "ISSUE-2");

    tracker
        .add_dependency(&second, &first, DependencyKind::Blocks)
        .await
        .unwrap();
    tracker
        .add_dependency(&first, &second, DependencyKind::Related)
        .await
        .unwrap();

    let children = tracker.list_children(&epic).await.unwrap();
    let ids: Vec<&str> = children.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec![first.as_str(), second.as_str()]);

    let tree = tracker.query_dependency_tree(&epic).await.unwrap();
    assert_eq!(tree.children.len(), 2);
    assert!(tree.children[0].blocked_by.is_empty(), "related links are ignored");
    assert_eq!(tree.children[1].blocked_by, vec![first.clone()]);
    assert!(tree.children.iter().all(|c| c.is_leaf()));
}

#[tokio::test]
async fn updates_and_close_change_only_the_given_fields() {
    let tracker = MemoryTracker::new();
    let id = tracker.create_issue("Old title", "body", None).await.unwrap();

    tracker
        .update_issue(
            &id,
            IssueFields {
                title: Some("New title".to_string()),
                scope_files: Some(vec!["src/cart.rs".to_string()]),
                size_metrics: Some(SizeMetrics::new(1, 80, 1.0)),
                ..IssueFields::default()
            },
        )
        .await
        .unwrap();
    tracker.close_issue(&id).await.unwrap();

    let issue = tracker.fetch_issue(&id).await.unwrap();
    assert_eq!(issue.title, "New title");
    assert_eq!(issue.description, "body");
    assert_eq!(issue.scope_files, vec!["src/cart.rs"]);
    assert_eq!(issue.state, SourceState::Closed);
}

#[tokio::test]
async fn unknown_issues_are_reported() {
    let tracker = MemoryTracker::new();
    assert!(matches!(
        tracker.fetch_issue("X-1").await,
        Err(WorkgateError::IssueNotFound(_))
    ));
    assert!(matches!(
        tracker.create_issue("orphan", "", Some("X-1")).await,
        Err(WorkgateError::IssueNotFound(_))
    ));
    assert!(tracker.close_issue("X-1").await.is_err());
}

#[test]
fn snapshots_round_trip_and_reject_dangling_links() {
    let issue = |id: &str, parent: Option<&str>| Issue {
        id: id.to_string(),
        title: id.to_string(),
        description: String::new(),
        state: SourceState::Open,
        parent: parent.map(str::to_string),
        scope_files: Vec::new(),
        size_metrics: SizeMetrics::default(),
    };

    let snapshot = TrackerSnapshot {
        issues: vec![issue("E", None), issue("T", Some("E"))],
        dependencies: vec![],
    };
    let tracker = MemoryTracker::from_snapshot(snapshot.clone()).unwrap();
    assert_eq!(tracker.snapshot(), snapshot);

    let orphan = TrackerSnapshot {
        issues: vec![issue("T", Some("missing"))],
        dependencies: vec![],
    };
    assert!(MemoryTracker::from_snapshot(orphan).is_err());

    let dangling = TrackerSnapshot {
        issues: vec![issue("E", None)],
        dependencies: vec![Dependency {
            issue: "E".to_string(),
            depends_on: "gone".to_string(),
            kind: DependencyKind::Blocks,
        }],
    };
    assert!(MemoryTracker::from_snapshot(dangling).is_err());

    let duplicate = TrackerSnapshot {
        issues: vec![issue("E", None), issue("E", None)],
        dependencies: vec![],
    };
    assert!(MemoryTracker::from_snapshot(duplicate).is_err());
}
