// src/engine/lifecycle.rs

//! Drives one dispatched unit until it either passes every gate or has to
//! be escalated.
//!
//! ```text
//! dispatch -> check worker answer -> select profile -> gate round
//!    ^               |                                     |
//!    +--- retry -----+                                     |
//!    +------------------ redispatch with issues -----------+
//! ```
//!
//! Worker failures (`validationPassed = false`, a backend error, or files
//! touched outside the declared scope) share one retry budget. A malformed
//! answer gets exactly one retry of its own; an accepted answer resets that
//! allowance.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::errors::{Result, WorkgateError};
use crate::exec::backend::WorkerBackend;
use crate::exec::contract::{DispatchRequest, WorkerResult};
use crate::gate::profile::GateSelector;
use crate::gate::runner::{GateOutcome, GateRunner, GateState};
use crate::plan::{FailureKind, FailureRecord, GateResult, WorkUnit};
use crate::scope::{normalize, ScopeMatcher};
use crate::types::UnitId;

use super::{UnitEvent, UnitOutcome};

/// Malformed worker answers tolerated before escalating.
const MALFORMED_RETRIES: usize = 1;

/// Snapshot of what a lifecycle needs to know about its unit.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitTask {
    pub unit: UnitId,
    pub title: String,
    pub description: String,
    pub declared_scope: Vec<String>,
    /// Files modified by earlier attempts, possibly in a previous run.
    pub files_modified: Vec<String>,
    /// Gate attempts from earlier runs, used to seed budgets and cached passes.
    pub history: Vec<GateResult>,
}

impl UnitTask {
    pub fn from_unit(unit: &WorkUnit) -> Self {
        Self {
            unit: unit.id.clone(),
            title: unit.title.clone(),
            description: unit.description.clone(),
            declared_scope: unit.scope_files.clone(),
            files_modified: unit.files_modified.clone(),
            history: unit.gate_results.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleSettings {
    pub restriction: String,
    pub quality_targets: Vec<String>,
    /// Redispatches allowed after worker failures.
    pub worker_retry_limit: u32,
}

/// Classified answer of one worker dispatch.
enum WorkerAnswer {
    Accepted(WorkerResult),
    Malformed(String),
    Failed(String),
}

/// Shared by every unit task of a run.
pub struct Lifecycle {
    worker: Arc<dyn WorkerBackend>,
    runner: GateRunner,
    selector: Arc<GateSelector>,
    settings: LifecycleSettings,
}

impl Lifecycle {
    pub fn new(
        worker: Arc<dyn WorkerBackend>,
        runner: GateRunner,
        selector: Arc<GateSelector>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            worker,
            runner,
            selector,
            settings,
        }
    }

    /// Run `task` to completion, reporting progress on `events`.
    ///
    /// Returns `Err` only for faults outside the unit's retry policy (a
    /// broken scope pattern, a profile conflict, the orchestrator going
    /// away).
    pub async fn drive(&self, task: UnitTask, events: mpsc::Sender<UnitEvent>) -> Result<()> {
        let unit = task.unit.clone();
        let matcher = ScopeMatcher::new(&task.declared_scope)?;
        let mut gate_state = GateState::from_history(&task.history);

        let mut scope: BTreeSet<String> =
            task.files_modified.iter().map(|f| normalize(f)).collect();
        let mut gate_issues: Vec<String> = Vec::new();
        let mut worker_issue: Option<String> = None;
        let mut worker_failures: Vec<Vec<String>> = Vec::new();
        let mut malformed: Vec<String> = Vec::new();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let mut blocking_issues: Vec<String> = worker_issue.iter().cloned().collect();
            blocking_issues.extend(gate_issues.iter().cloned());

            let request = DispatchRequest {
                unit_id: unit.clone(),
                title: task.title.clone(),
                description: task.description.clone(),
                scope_files: task.declared_scope.clone(),
                restriction: self.settings.restriction.clone(),
                quality_targets: self.settings.quality_targets.clone(),
                blocking_issues,
                attempt,
            };

            info!(
                unit = %unit,
                attempt,
                issues = request.blocking_issues.len(),
                "dispatching unit to worker"
            );
            let response = self.worker.dispatch(request).await;

            let result = match self.check_answer(&unit, &matcher, response) {
                WorkerAnswer::Accepted(result) => {
                    malformed.clear();
                    result
                }
                WorkerAnswer::Malformed(reason) => {
                    send(&events, UnitEvent::WorkerReturned { unit: unit.clone(), files_modified: None }).await?;
                    malformed.push(reason.clone());
                    if malformed.len() > MALFORMED_RETRIES {
                        let record = FailureRecord {
                            kind: FailureKind::ValidationError,
                            gate: None,
                            reason,
                            history: malformed.iter().map(|r| vec![r.clone()]).collect(),
                        };
                        return finish_failed(&events, &unit, record).await;
                    }
                    continue;
                }
                WorkerAnswer::Failed(issue) => {
                    send(&events, UnitEvent::WorkerReturned { unit: unit.clone(), files_modified: None }).await?;
                    worker_failures.push(vec![issue.clone()]);
                    if worker_failures.len() > self.settings.worker_retry_limit as usize {
                        warn!(unit = %unit, failures = worker_failures.len(), "worker retry budget exhausted; escalating");
                        let record = FailureRecord {
                            kind: FailureKind::WorkerFailure,
                            gate: None,
                            reason: issue,
                            history: worker_failures,
                        };
                        return finish_failed(&events, &unit, record).await;
                    }
                    worker_issue = Some(issue);
                    continue;
                }
            };

            worker_issue = None;
            let changed: BTreeSet<String> =
                result.files_modified.iter().map(|f| normalize(f)).collect();
            scope.extend(changed.iter().cloned());
            let scope_list: Vec<String> = scope.iter().cloned().collect();

            send(
                &events,
                UnitEvent::WorkerReturned {
                    unit: unit.clone(),
                    files_modified: Some(scope_list.clone()),
                },
            )
            .await?;

            let (work_types, profile) = self.selector.select(&scope_list)?;
            info!(
                unit = %unit,
                work_types = ?work_types,
                gate1 = ?profile.gate1,
                gate2 = ?profile.gate2,
                "running gates"
            );

            let round = self
                .runner
                .run_round(&unit, &profile, &mut gate_state, &scope, &changed)
                .await?;

            if !round.results.is_empty() {
                send(
                    &events,
                    UnitEvent::GateResults {
                        unit: unit.clone(),
                        results: round.results,
                    },
                )
                .await?;
            }

            match round.outcome {
                GateOutcome::Passed => {
                    info!(unit = %unit, skipped = ?round.skipped, "all gates passed");
                    return send(
                        &events,
                        UnitEvent::Finished {
                            unit: unit.clone(),
                            outcome: UnitOutcome::Completed,
                        },
                    )
                    .await;
                }
                GateOutcome::Redispatch { issues, .. } => {
                    gate_issues = issues;
                }
                GateOutcome::Exhausted(record) => {
                    return finish_failed(&events, &unit, record).await;
                }
            }
        }
    }

    fn check_answer(
        &self,
        unit: &str,
        matcher: &ScopeMatcher,
        response: Result<serde_json::Value>,
    ) -> WorkerAnswer {
        let value = match response {
            Ok(value) => value,
            Err(WorkgateError::ValidationError(reason)) => {
                warn!(unit, %reason, "malformed worker answer");
                return WorkerAnswer::Malformed(reason);
            }
            Err(e) => {
                warn!(unit, error = %e, "worker failed");
                return WorkerAnswer::Failed(format!("worker failed: {e}"));
            }
        };

        let result = match WorkerResult::from_value(value) {
            Ok(result) => result,
            Err(e) => {
                warn!(unit, error = %e, "malformed worker answer");
                return WorkerAnswer::Malformed(e.to_string());
            }
        };

        if !result.validation_passed {
            warn!(unit, summary = %result.narrative_summary, "worker reported failed validation");
            return WorkerAnswer::Failed(format!(
                "worker reported failed validation: {}",
                result.narrative_summary
            ));
        }

        let violations = matcher.violations(&result.files_modified);
        if !violations.is_empty() {
            let err = WorkgateError::ScopeViolation {
                unit: unit.to_string(),
                files: violations,
            };
            warn!(unit, error = %err, "worker touched files outside its scope; redispatching");
            return WorkerAnswer::Failed(err.to_string());
        }

        WorkerAnswer::Accepted(result)
    }
}

async fn send(events: &mpsc::Sender<UnitEvent>, event: UnitEvent) -> Result<()> {
    events
        .send(event)
        .await
        .map_err(|_| WorkgateError::Other(anyhow!("orchestrator stopped listening for unit events")))
}

async fn finish_failed(
    events: &mpsc::Sender<UnitEvent>,
    unit: &str,
    record: FailureRecord,
) -> Result<()> {
    send(
        events,
        UnitEvent::Finished {
            unit: unit.to_string(),
            outcome: UnitOutcome::Failed(record),
        },
    )
    .await
}
