mod common;

use std::collections::{BTreeMap, BTreeSet};

use common::advance;
use proptest::prelude::*;
use serde_json::json;
use workgate::fs::mock::MockFileSystem;
use workgate::plan::{FilePlanStore, GateResult, Plan, PlanStore, UnitNote};
use workgate::types::UnitStatus;
use workgate_test_utils::{PlanBuilder, UnitSpecBuilder};

const STATUSES: [UnitStatus; 7] = [
    UnitStatus::Pending,
    UnitStatus::Ready,
    UnitStatus::Dispatched,
    UnitStatus::GateRunning,
    UnitStatus::Completed,
    UnitStatus::Failed,
    UnitStatus::Skipped,
];

#[derive(Debug, Clone)]
struct UnitShape {
    hours: f64,
    after_previous: bool,
    status: usize,
    /// `(passed, duration metric, attempt)` per gate attempt.
    gates: Vec<(bool, f64, u32)>,
    touched: bool,
}

fn unit_shape() -> impl Strategy<Value = UnitShape> {
    (
        0.0f64..=2.0,
        any::<bool>(),
        0..STATUSES.len(),
        proptest::collection::vec((any::<bool>(), -1.0e6f64..1.0e6, 1u32..4), 0..4),
        any::<bool>(),
    )
        .prop_map(|(hours, after_previous, status, gates, touched)| UnitShape {
            hours,
            after_previous,
            status,
            gates,
            touched,
        })
}

fn build(shapes: &[UnitShape]) -> Plan {
    let mut builder = PlanBuilder::new("prop");
    for (i, shape) in shapes.iter().enumerate() {
        let file = format!("src/u{i}.rs");
        let mut spec = UnitSpecBuilder::new(&format!("u{i}"))
            .size(1, 100, shape.hours)
            .scope(&[file.as_str()]);
        if i > 0 && shape.after_previous {
            spec = spec.blocked_by(&format!("u{}", i - 1));
        }
        builder = builder.unit(spec);
    }
    let mut plan = builder.build();

    for (i, shape) in shapes.iter().enumerate() {
        let id = format!("u{i}");
        let file = format!("src/u{i}.rs");
        advance(&mut plan, &id, STATUSES[shape.status]);

        let results: Vec<GateResult> = shape
            .gates
            .iter()
            .map(|(passed, duration, attempt)| GateResult {
                gate_name: "test-execution".to_string(),
                passed: *passed,
                blocking_issues: if *passed {
                    Vec::new()
                } else {
                    vec!["failing test".to_string()]
                },
                metrics: BTreeMap::from([("duration".to_string(), json!(duration))]),
                attempt_number: *attempt,
                observed_files: BTreeSet::from([file.clone()]),
            })
            .collect();
        let mut notes = vec![UnitNote::GateResults(results)];
        if shape.touched {
            notes.push(UnitNote::FilesModified(vec![file]));
        }
        plan.apply_notes(&id, &notes).unwrap();
    }
    plan
}

proptest! {
    #[test]
    fn saved_plans_load_back_unchanged(shapes in proptest::collection::vec(unit_shape(), 1..6)) {
        let plan = build(&shapes);
        let fs = MockFileSystem::new();
        let mut store = FilePlanStore::new(fs.clone(), "plans", "prop");

        store.save(&plan).unwrap();
        let loaded = store.load();
        prop_assert!(loaded.is_ok(), "load failed: {:?}", loaded.err());
        prop_assert_eq!(loaded.unwrap(), plan.clone());

        // A second store over the same files sees the same plan, and a
        // load-modify-save cycle keeps it intact.
        let mut reopened = FilePlanStore::new(fs, "plans", "prop");
        reopened.annotate("u0", &[]).unwrap();
        prop_assert_eq!(reopened.load().unwrap(), plan);
    }
}
