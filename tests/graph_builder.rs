use workgate::dag::{DagGraph, GraphBuilder};
use workgate::errors::WorkgateError;
use workgate::tracker::{Dependency, DependencyKind, Issue, IssueNode};
use workgate::types::{GroupNumber, SizeMetrics, SourceState, Strategy, UnitStatus};
use workgate::{build_plan, Decomposition};
use workgate_test_utils::{PlanBuilder, UnitSpecBuilder};

fn leaf(id: &str) -> IssueNode {
    IssueNode {
        id: id.to_string(),
        title: format!("leaf {id}"),
        size_metrics: SizeMetrics::new(1, 40, 0.5),
        ..IssueNode::default()
    }
}

fn label(id: &str, children: Vec<IssueNode>) -> IssueNode {
    IssueNode {
        id: id.to_string(),
        title: format!("label {id}"),
        children,
        ..IssueNode::default()
    }
}

fn issue(id: &str, parent: Option<&str>) -> Issue {
    Issue {
        id: id.to_string(),
        title: format!("issue {id}"),
        description: String::new(),
        state: SourceState::Open,
        parent: parent.map(str::to_string),
        scope_files: Vec::new(),
        size_metrics: SizeMetrics::new(1, 40, 0.5),
    }
}

#[test]
fn flat_units_keep_declaration_order_and_start_pending() {
    let plan = PlanBuilder::new("flat")
        .unit(UnitSpecBuilder::new("a"))
        .unit(UnitSpecBuilder::new("b").blocked_by("a"))
        .build();

    let ids: Vec<&str> = plan.units().iter().map(|u| u.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert!(plan
        .units()
        .iter()
        .all(|u| u.status == UnitStatus::Pending));
    assert_eq!(plan.edges(), vec![("a".to_string(), "b".to_string())]);
    assert_eq!(plan.unit("a").unwrap().group_number, GroupNumber::new(1, 1));
    assert_eq!(plan.unit("b").unwrap().group_number, GroupNumber::new(1, 2));
}

#[test]
fn mutual_dependency_is_a_cycle() {
    let result = PlanBuilder::new("cycle")
        .unit(UnitSpecBuilder::new("a").blocked_by("b"))
        .unit(UnitSpecBuilder::new("b").blocked_by("a"))
        .try_build();

    match result {
        Err(WorkgateError::CyclicDependency(msg)) => {
            assert!(msg.contains("a -> b -> a"), "{msg}");
        }
        other => panic!("Expected CyclicDependency, got {other:?}"),
    }
}

#[test]
fn six_files_exceed_the_ceiling() {
    let result = PlanBuilder::new("big")
        .unit(UnitSpecBuilder::new("small"))
        .unit(UnitSpecBuilder::new("wide").scope(&[
            "src/a.rs", "src/b.rs", "src/c.rs", "src/d.rs", "src/e.rs", "src/f.rs",
        ]))
        .try_build();

    match result {
        Err(WorkgateError::OversizedUnit { unit, reason }) => {
            assert_eq!(unit, "wide");
            assert!(reason.contains("6 files"), "{reason}");
        }
        other => panic!("Expected OversizedUnit, got {other:?}"),
    }
}

#[test]
fn loc_and_hour_ceilings_are_enforced() {
    let too_long = PlanBuilder::new("loc")
        .unit(UnitSpecBuilder::new("a").size(1, 501, 1.0))
        .try_build();
    assert!(matches!(too_long, Err(WorkgateError::OversizedUnit { .. })));

    let too_slow = PlanBuilder::new("hours")
        .unit(UnitSpecBuilder::new("a").size(1, 100, 2.5))
        .try_build();
    assert!(matches!(too_slow, Err(WorkgateError::OversizedUnit { .. })));

    let at_limit = PlanBuilder::new("edge")
        .unit(UnitSpecBuilder::new("a").size(5, 500, 2.0))
        .try_build();
    assert!(at_limit.is_ok());
}

#[test]
fn unknown_dependency_is_rejected() {
    let result = PlanBuilder::new("dangling")
        .unit(UnitSpecBuilder::new("a").blocked_by("nope"))
        .try_build();

    match result {
        Err(WorkgateError::UnknownDependency { unit, dep }) => {
            assert_eq!(unit, "a");
            assert_eq!(dep, "nope");
        }
        other => panic!("Expected UnknownDependency, got {other:?}"),
    }
}

#[test]
fn duplicate_ids_are_rejected() {
    let result = PlanBuilder::new("dup")
        .unit(UnitSpecBuilder::new("a"))
        .unit(UnitSpecBuilder::new("a"))
        .try_build();
    assert!(matches!(result, Err(WorkgateError::DuplicateUnit(id)) if id == "a"));
}

#[test]
fn only_closed_units_is_an_empty_plan() {
    let result = PlanBuilder::new("done")
        .unit(UnitSpecBuilder::new("a").state(SourceState::Closed))
        .try_build();
    assert!(matches!(result, Err(WorkgateError::EmptyPlan)));
}

#[test]
fn closed_dependencies_count_as_satisfied() {
    let plan = PlanBuilder::new("partial")
        .unit(UnitSpecBuilder::new("done").state(SourceState::Closed))
        .unit(UnitSpecBuilder::new("next").blocked_by("done"))
        .build();

    assert_eq!(plan.len(), 1);
    assert!(!plan.contains("done"));
    assert!(plan.unit("next").unwrap().blocked_by.is_empty());
}

#[test]
fn strategy_follows_unit_count() {
    let single = PlanBuilder::new("one")
        .unit(UnitSpecBuilder::new("a"))
        .build();
    assert_eq!(single.strategy(), Strategy::SingleUnit);

    let mut shared = PlanBuilder::new("few");
    for id in ["a", "b", "c", "d"] {
        let file = format!("src/{id}.rs");
        shared = shared.unit(UnitSpecBuilder::new(id).scope(&[file.as_str()]));
    }
    assert_eq!(shared.build().strategy(), Strategy::SharedBranch);

    let mut isolated = PlanBuilder::new("many");
    for id in ["a", "b", "c", "d", "e"] {
        let file = format!("src/{id}.rs");
        isolated = isolated.unit(UnitSpecBuilder::new(id).scope(&[file.as_str()]));
    }
    assert_eq!(isolated.build().strategy(), Strategy::IsolatedWorktrees);
}

#[test]
fn hot_file_forces_shared_branch() {
    let mut builder = PlanBuilder::new("hot");
    for id in ["a", "b", "c", "d", "e", "f"] {
        builder = builder.unit(UnitSpecBuilder::new(id).scope(&["src/lib.rs"]));
    }
    assert_eq!(builder.build().strategy(), Strategy::SharedBranch);
}

#[test]
fn tree_leaves_inherit_group_numbers_from_their_label() {
    let mut closed = leaf("L3");
    closed.state = SourceState::Closed;

    let tree = label(
        "EPIC",
        vec![
            label("F1", vec![leaf("L1"), leaf("L2")]),
            label("F2", vec![closed, leaf("L4")]),
        ],
    );

    let plan = GraphBuilder::new("tree").from_tree(&[tree]).unwrap();

    let ids: Vec<&str> = plan.units().iter().map(|u| u.id.as_str()).collect();
    assert_eq!(ids, vec!["L1", "L2", "L4"]);
    assert_eq!(plan.unit("L1").unwrap().group_number.to_string(), "1.1");
    assert_eq!(plan.unit("L2").unwrap().group_number.to_string(), "1.2");
    assert_eq!(plan.unit("L4").unwrap().group_number.to_string(), "2.1");

    // Labels never become units.
    assert!(!plan.contains("EPIC") && !plan.contains("F1") && !plan.contains("F2"));
}

#[test]
fn dependency_on_a_label_expands_to_its_leaves() {
    let mut blocked = leaf("L3");
    blocked.blocked_by = vec!["F1".to_string()];

    let tree = label(
        "EPIC",
        vec![
            label("F1", vec![leaf("L1"), leaf("L2")]),
            label("F2", vec![blocked]),
        ],
    );

    let plan = GraphBuilder::new("tree").from_tree(&[tree]).unwrap();
    let deps: Vec<&str> = plan
        .unit("L3")
        .unwrap()
        .blocked_by
        .iter()
        .map(String::as_str)
        .collect();
    assert_eq!(deps, vec!["L1", "L2"]);

    let order = DagGraph::from_plan(&plan).topological_order().unwrap();
    assert_eq!(order.last().map(String::as_str), Some("L3"));
}

#[tokio::test]
async fn tree_decomposition_is_read_through_the_tracker() {
    let decomposition = Decomposition::Tree {
        root: Some("EPIC".to_string()),
        issues: vec![
            issue("EPIC", None),
            issue("F1", Some("EPIC")),
            issue("T1", Some("F1")),
            issue("T2", Some("F1")),
        ],
        dependencies: vec![
            Dependency {
                issue: "T2".to_string(),
                depends_on: "T1".to_string(),
                kind: DependencyKind::Blocks,
            },
            Dependency {
                issue: "T1".to_string(),
                depends_on: "T2".to_string(),
                kind: DependencyKind::Related,
            },
        ],
    };

    let (plan, tracker) = build_plan("tree", decomposition).await.unwrap();
    assert!(tracker.is_some());
    assert_eq!(plan.len(), 2);
    assert_eq!(plan.strategy(), Strategy::SharedBranch);
    assert_eq!(plan.edges(), vec![("T1".to_string(), "T2".to_string())]);
}

#[tokio::test]
async fn flat_decomposition_parses_from_json() {
    let input = r#"{
        "kind": "flat",
        "units": [
            { "id": "a", "title": "first", "scopeFiles": ["src/a.rs"], "sizeMetrics": { "files": 1, "loc": 10, "hours": 0.5 } },
            { "id": "b", "title": "second", "blockedBy": ["a"] }
        ]
    }"#;

    let decomposition: Decomposition = serde_json::from_str(input).unwrap();
    let (plan, tracker) = build_plan("flat", decomposition).await.unwrap();
    assert!(tracker.is_none());
    assert_eq!(plan.unit("a").unwrap().scope_files, vec!["src/a.rs"]);
    assert_eq!(plan.dependents_of("a"), vec!["b".to_string()]);
}
