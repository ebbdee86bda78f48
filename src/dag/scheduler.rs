use tracing::{debug, info};

use crate::dag::graph::DagGraph;
use crate::dag::scheduler_step::SchedulerStep;
use crate::plan::Plan;
use crate::scope::scopes_overlap;
use crate::types::{Strategy, UnitId, UnitStatus};

/// Scheduler holds the immutable dependency graph plus the plan's strategy.
///
/// It never mutates the plan itself; it tells the orchestrator which
/// transitions to commit:
/// - `Pending -> Ready` once every unit in `blocked_by` is `Completed`
/// - `Pending -> Skipped` when an upstream unit ended without completing
/// - which `Ready` units to dispatch now, honouring the strategy
#[derive(Debug, Clone)]
pub struct Scheduler {
    graph: DagGraph,
    strategy: Strategy,
    max_parallel: usize,
}

impl Scheduler {
    /// Construct a scheduler for `plan`. `max_parallel` caps concurrent
    /// dispatch under isolated worktrees and is ignored otherwise.
    pub fn for_plan(plan: &Plan, max_parallel: usize) -> Self {
        Self {
            graph: DagGraph::from_plan(plan),
            strategy: plan.strategy(),
            max_parallel: max_parallel.max(1),
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }

    /// Whether every dependency of `unit` is `Completed`.
    ///
    /// Returns `None` if the unit is unknown.
    pub fn deps_satisfied(&self, plan: &Plan, unit: &str) -> Option<bool> {
        if !plan.contains(unit) {
            return None;
        }
        Some(
            self.graph
                .dependencies_of(unit)
                .iter()
                .all(|dep| plan.status_of(dep) == Some(UnitStatus::Completed)),
        )
    }

    /// First dependency of `unit` that ended without completing.
    fn dead_dependency(&self, plan: &Plan, unit: &str) -> Option<UnitId> {
        self.graph
            .dependencies_of(unit)
            .iter()
            .find(|dep| {
                matches!(
                    plan.status_of(dep),
                    Some(UnitStatus::Failed) | Some(UnitStatus::Skipped)
                )
            })
            .cloned()
    }

    /// Compute promotions and retirements for the current plan state.
    pub fn step(&self, plan: &Plan) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        for unit in plan.units() {
            if unit.status != UnitStatus::Pending {
                continue;
            }

            if let Some(dep) = self.dead_dependency(plan, &unit.id) {
                debug!(unit = %unit.id, upstream = %dep, "upstream unit did not complete; retiring");
                step.retired.push((unit.id.clone(), dep));
            } else if self.deps_satisfied(plan, &unit.id) == Some(true) {
                debug!(unit = %unit.id, "dependencies completed; ready");
                step.promoted.push(unit.id.clone());
            }
        }

        step
    }

    /// `Ready` units ordered by group number, then declaration order.
    pub fn ready_queue(&self, plan: &Plan) -> Vec<UnitId> {
        let mut ready: Vec<(_, usize, UnitId)> = plan
            .units()
            .iter()
            .enumerate()
            .filter(|(_, u)| u.status == UnitStatus::Ready)
            .map(|(pos, u)| (u.group_number.group, pos, u.id.clone()))
            .collect();
        ready.sort();
        ready.into_iter().map(|(_, _, id)| id).collect()
    }

    /// Pick the `Ready` units to dispatch now, given the units already in
    /// flight.
    ///
    /// Shared-workspace strategies dispatch one unit at a time. Isolated
    /// worktrees dispatch concurrently only among units with no dependency
    /// path between them and disjoint declared scope.
    pub fn select_dispatch(&self, plan: &Plan, in_flight: &[UnitId]) -> Vec<UnitId> {
        let ready = self.ready_queue(plan);
        if ready.is_empty() {
            return Vec::new();
        }

        if self.strategy.is_shared_workspace() {
            if !in_flight.is_empty() {
                return Vec::new();
            }
            return ready.into_iter().take(1).collect();
        }

        let capacity = self.max_parallel.saturating_sub(in_flight.len());
        let mut chosen: Vec<UnitId> = Vec::new();

        for id in ready {
            if chosen.len() >= capacity {
                break;
            }
            let conflict = in_flight
                .iter()
                .chain(chosen.iter())
                .find(|other| self.conflicts(plan, &id, other));

            match conflict {
                Some(other) => {
                    debug!(unit = %id, with = %other, "holding back unit; overlaps work in flight");
                }
                None => chosen.push(id),
            }
        }

        if !chosen.is_empty() {
            info!(units = ?chosen, in_flight = in_flight.len(), "selected units for dispatch");
        }

        chosen
    }

    /// Whether two units may not run at the same time.
    pub fn conflicts(&self, plan: &Plan, a: &str, b: &str) -> bool {
        if self.graph.related(a, b) {
            return true;
        }
        match (plan.unit(a), plan.unit(b)) {
            (Some(ua), Some(ub)) => scopes_overlap(&ua.scope_files, &ub.scope_files),
            _ => true,
        }
    }
}
