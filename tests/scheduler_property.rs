use proptest::prelude::*;
use workgate::dag::Scheduler;
use workgate::plan::Plan;
use workgate::types::{Strategy as DispatchStrategy, UnitId, UnitStatus};
use workgate_test_utils::{PlanBuilder, UnitSpecBuilder};

const FILES: [&str; 4] = ["src/a.rs", "src/b.rs", "src/shared", "src/shared/x.rs"];

/// Unit `i` may only depend on units `< i`, so every generated plan is
/// acyclic.
fn plan_strategy() -> impl Strategy<Value = (Vec<(Vec<usize>, usize)>, bool, usize)> {
    (1usize..8)
        .prop_flat_map(|n| {
            let units = (0..n)
                .map(|i| {
                    let deps = if i == 0 {
                        Just(Vec::new()).boxed()
                    } else {
                        proptest::collection::vec(0..i, 0..=i.min(3)).boxed()
                    };
                    (deps, 0..FILES.len())
                })
                .collect::<Vec<_>>();
            (units, any::<bool>(), 1usize..4)
        })
}

fn build(units: &[(Vec<usize>, usize)], isolated: bool) -> Plan {
    let mut builder = PlanBuilder::new("prop");
    for (i, (deps, file)) in units.iter().enumerate() {
        let mut spec = UnitSpecBuilder::new(&format!("u{i}")).scope(&[FILES[*file]]);
        for dep in deps {
            spec = spec.blocked_by(&format!("u{dep}"));
        }
        builder = builder.unit(spec);
    }
    let strategy = if isolated {
        DispatchStrategy::IsolatedWorktrees
    } else {
        DispatchStrategy::SharedBranch
    };
    builder.build_with_strategy(strategy)
}

proptest! {
    #[test]
    fn dispatch_respects_dependencies_and_scope((units, isolated, max_parallel) in plan_strategy()) {
        let mut plan = build(&units, isolated);
        let scheduler = Scheduler::for_plan(&plan, max_parallel);
        let mut in_flight: Vec<UnitId> = Vec::new();

        // Each round dispatches what it can, then completes the oldest unit.
        for _ in 0..(units.len() * 4 + 4) {
            loop {
                let step = scheduler.step(&plan);
                if step.is_empty() {
                    break;
                }
                prop_assert!(step.retired.is_empty(), "nothing fails in this run");
                for id in &step.promoted {
                    plan.apply_transition(id, UnitStatus::Pending, UnitStatus::Ready).unwrap();
                }
            }

            for id in scheduler.select_dispatch(&plan, &in_flight) {
                let unit = plan.unit(&id).unwrap();
                for dep in &unit.blocked_by {
                    prop_assert_eq!(plan.status_of(dep), Some(UnitStatus::Completed));
                }
                for other in &in_flight {
                    prop_assert!(!scheduler.conflicts(&plan, &id, other));
                }
                plan.apply_transition(&id, UnitStatus::Ready, UnitStatus::Dispatched).unwrap();
                in_flight.push(id);
            }

            if isolated {
                prop_assert!(in_flight.len() <= max_parallel);
            } else {
                prop_assert!(in_flight.len() <= 1);
            }

            if in_flight.is_empty() {
                break;
            }
            let done = in_flight.remove(0);
            plan.apply_transition(&done, UnitStatus::Dispatched, UnitStatus::GateRunning).unwrap();
            plan.apply_transition(&done, UnitStatus::GateRunning, UnitStatus::Completed).unwrap();
        }

        prop_assert!(plan.is_finished());
        prop_assert_eq!(plan.ids_with_status(UnitStatus::Completed).len(), units.len());
    }
}
