// src/dag/scheduler_step.rs

//! Result type for a scheduler step.

use crate::types::UnitId;

/// Transitions the scheduler wants committed after looking at the plan.
///
/// Handy for tests that step the plan by hand and assert on what changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStep {
    /// Units whose dependencies all completed (`Pending -> Ready`).
    pub promoted: Vec<UnitId>,
    /// Units that can never run, paired with the upstream unit that ended
    /// without completing (`Pending -> Skipped`).
    pub retired: Vec<(UnitId, UnitId)>,
}

impl SchedulerStep {
    pub fn is_empty(&self) -> bool {
        self.promoted.is_empty() && self.retired.is_empty()
    }
}
