#![allow(dead_code)]

use std::sync::Arc;

use workgate::engine::{Orchestrator, OrchestratorOptions, RunReport};
use workgate::gate::GateSelector;
use workgate::plan::{MemoryPlanStore, Plan, PlanStore};
use workgate::types::UnitStatus;
use workgate_test_utils::{FakeGates, FakeWorker};

pub use workgate_test_utils::{init_tracing, with_timeout};

/// A memory store that already holds `plan`.
pub fn seeded_store(plan: &Plan) -> MemoryPlanStore {
    let mut store = MemoryPlanStore::new(plan.name());
    store.save(plan).expect("seeding memory store");
    store
}

pub fn orchestrator(
    store: MemoryPlanStore,
    options: OrchestratorOptions,
    worker: &FakeWorker,
    gates: &FakeGates,
) -> Orchestrator<MemoryPlanStore> {
    Orchestrator::new(
        store,
        options,
        Arc::new(worker.clone()),
        Arc::new(gates.clone()),
        GateSelector::builtin().expect("builtin selector"),
    )
}

/// Run `plan` to the end with the built-in gate profiles and return the
/// report together with the persisted plan.
pub async fn drive(
    plan: &Plan,
    options: OrchestratorOptions,
    worker: &FakeWorker,
    gates: &FakeGates,
) -> (RunReport, Plan) {
    let mut orch = orchestrator(seeded_store(plan), options, worker, gates);
    let report = with_timeout(orch.run()).await.expect("run should succeed");
    let persisted = orch.store().load().expect("persisted plan");
    (report, persisted)
}

/// Walk `unit` through the state machine up to `target`.
pub fn advance(plan: &mut Plan, unit: &str, target: UnitStatus) {
    use UnitStatus::*;
    let path: &[UnitStatus] = match target {
        Pending => &[],
        Ready => &[Ready],
        Dispatched => &[Ready, Dispatched],
        GateRunning => &[Ready, Dispatched, GateRunning],
        Completed => &[Ready, Dispatched, GateRunning, Completed],
        Failed => &[Ready, Dispatched, GateRunning, Failed],
        Skipped => &[Skipped],
    };

    let mut from = plan.status_of(unit).expect("unit exists");
    let start = path.iter().position(|s| *s == from).map_or(0, |p| p + 1);
    for &to in &path[start..] {
        plan.apply_transition(unit, from, to)
            .expect("valid walk through the state machine");
        from = to;
    }
}
