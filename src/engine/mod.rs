// src/engine/mod.rs

//! Orchestration engine.
//!
//! The [`orchestrator`] is the single control loop that owns the plan: it
//! asks the scheduler what may run, commits every transition through the
//! plan store and reacts to [`UnitEvent`]s. Each dispatched unit is driven
//! by a [`lifecycle`] task (worker dispatch, contract checks, gate rounds)
//! that only reports back over a channel and never writes the store itself.
//!
//! [`operator`] holds the out-of-loop operations (`skip`).

use std::fmt;

use crate::plan::{FailureRecord, GateResult, Plan};
use crate::types::{UnitId, UnitStatus};

pub mod lifecycle;
pub mod operator;
pub mod orchestrator;

pub use lifecycle::{Lifecycle, LifecycleSettings, UnitTask};
pub use operator::skip_unit;
pub use orchestrator::{Orchestrator, OrchestratorOptions};

/// How a unit's lifecycle ended.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitOutcome {
    Completed,
    Failed(FailureRecord),
}

/// Events flowing into the orchestrator from unit tasks and signal handlers.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitEvent {
    /// The worker answered a dispatch, successfully or not. `files_modified`
    /// is the unit's accumulated set of modified files when the answer was
    /// accepted.
    WorkerReturned {
        unit: UnitId,
        files_modified: Option<Vec<String>>,
    },
    /// A gate round finished; these attempts must be attached to the unit.
    GateResults {
        unit: UnitId,
        results: Vec<GateResult>,
    },
    Finished {
        unit: UnitId,
        outcome: UnitOutcome,
    },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

/// Final (or, after a shutdown, partial) state of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub plan: String,
    pub completed: Vec<UnitId>,
    pub failed: Vec<(UnitId, Option<FailureRecord>)>,
    pub skipped: Vec<(UnitId, Option<String>)>,
    /// Units still in flight when the run stopped early.
    pub interrupted: Vec<UnitId>,
    /// Units found mid-flight at startup and put back to `Ready`.
    pub requeued: Vec<UnitId>,
}

impl RunReport {
    pub fn from_plan(plan: &Plan, requeued: Vec<UnitId>, interrupted: Vec<UnitId>) -> Self {
        let mut report = RunReport {
            plan: plan.name().to_string(),
            requeued,
            interrupted,
            ..RunReport::default()
        };

        for unit in plan.units() {
            match unit.status {
                UnitStatus::Completed => report.completed.push(unit.id.clone()),
                UnitStatus::Failed => report.failed.push((unit.id.clone(), unit.failure.clone())),
                UnitStatus::Skipped => report
                    .skipped
                    .push((unit.id.clone(), unit.skip_reason.clone())),
                _ => {}
            }
        }

        report
    }

    /// Every unit completed or was skipped, and the run was not cut short.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.interrupted.is_empty()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "plan {}:", self.plan)?;
        writeln!(f, "  completed: {}", self.completed.len())?;
        writeln!(f, "  skipped: {}", self.skipped.len())?;
        writeln!(f, "  failed: {}", self.failed.len())?;
        if !self.requeued.is_empty() {
            writeln!(f, "  requeued at start: {:?}", self.requeued)?;
        }
        if !self.interrupted.is_empty() {
            writeln!(f, "  interrupted: {:?}", self.interrupted)?;
        }

        for (unit, reason) in &self.skipped {
            if let Some(reason) = reason {
                writeln!(f, "  - {unit} skipped: {reason}")?;
            }
        }

        for (unit, record) in &self.failed {
            match record {
                Some(record) => {
                    let gate = record.gate.as_deref().unwrap_or("worker");
                    writeln!(f, "  - {unit} FAILED at {gate}: {}", record.reason)?;
                    for (attempt, issues) in record.history.iter().enumerate() {
                        writeln!(f, "      attempt {}: {}", attempt + 1, issues.join("; "))?;
                    }
                }
                None => writeln!(f, "  - {unit} FAILED")?,
            }
        }

        Ok(())
    }
}
