// src/gate/runner.rs

//! Gate execution for one unit.
//!
//! A round runs the blocking stage (`gate1`, one gate at a time, stopping at
//! the first failure) and, only if that passed, the parallel stage (`gate2`,
//! all gates concurrently). The round ends in one of three ways:
//!
//! - every gate passed
//! - the worker must be redispatched with the issues to fix
//! - a gate ran out of retries, and the unit must be escalated
//!
//! A gate that already passed is not run again unless the files changed
//! since then overlap the files it looked at ([`GateState::is_clean`]).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::anyhow;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::errors::{Result, WorkgateError};
use crate::exec::backend::GateBackend;
use crate::exec::contract::{GateReport, GateRequest};
use crate::gate::profile::GateProfile;
use crate::plan::{FailureKind, FailureRecord, GateResult};
use crate::scope::entries_overlap;

/// Which stage of a profile a redispatch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Blocking,
    Parallel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    Passed,
    /// Send the unit back to its worker with these issues.
    Redispatch { stage: Stage, issues: Vec<String> },
    /// A gate ran out of retries (or kept answering garbage).
    Exhausted(FailureRecord),
}

/// Everything one round produced.
#[derive(Debug, Clone, PartialEq)]
pub struct GateRound {
    /// New gate attempts, in profile order.
    pub results: Vec<GateResult>,
    /// Gates not run because their last pass is still valid.
    pub skipped: Vec<String>,
    pub outcome: GateOutcome,
}

/// Per-unit gate bookkeeping: attempt counters, failure history per gate
/// and the file set each still-valid pass observed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GateState {
    passed: BTreeMap<String, BTreeSet<String>>,
    attempts: BTreeMap<String, u32>,
    failures: BTreeMap<String, Vec<Vec<String>>>,
}

impl GateState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the state from a unit's persisted gate results.
    pub fn from_history(results: &[GateResult]) -> Self {
        let mut state = Self::default();
        for result in results {
            state.record(result);
        }
        state
    }

    pub fn record(&mut self, result: &GateResult) {
        let attempts = self.attempts.entry(result.gate_name.clone()).or_insert(0);
        *attempts = (*attempts).max(result.attempt_number);

        if result.passed {
            self.passed
                .insert(result.gate_name.clone(), result.observed_files.clone());
        } else {
            self.passed.remove(&result.gate_name);
            self.failures
                .entry(result.gate_name.clone())
                .or_default()
                .push(result.blocking_issues.clone());
        }
    }

    pub fn attempts(&self, gate: &str) -> u32 {
        self.attempts.get(gate).copied().unwrap_or(0)
    }

    /// Blocking issues of every failed attempt of `gate`, oldest first.
    pub fn failure_history(&self, gate: &str) -> &[Vec<String>] {
        self.failures.get(gate).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `gate` passed before and none of `changed` touches what it
    /// observed then.
    ///
    /// Nothing changed means clean. A pass that observed no files at all
    /// cannot be compared and is treated as dirty.
    pub fn is_clean(&self, gate: &str, changed: &BTreeSet<String>) -> bool {
        let Some(observed) = self.passed.get(gate) else {
            return false;
        };
        if changed.is_empty() {
            return true;
        }
        if observed.is_empty() {
            return false;
        }
        !changed
            .iter()
            .any(|c| observed.iter().any(|o| entries_overlap(o, c)))
    }

    fn is_exhausted(&self, gate: &str, limit: u32) -> bool {
        self.failure_history(gate).len() > limit as usize
    }
}

/// Outcome of asking the backend to run one gate once.
struct GateExecution {
    result: GateResult,
    /// Set when the gate answered with a malformed report twice in a row.
    malformed: Option<String>,
}

/// Executes gate profiles against a [`GateBackend`].
#[derive(Clone)]
pub struct GateRunner {
    gates: Arc<dyn GateBackend>,
    default_retry_limit: u32,
}

impl GateRunner {
    pub fn new(gates: Arc<dyn GateBackend>, default_retry_limit: u32) -> Self {
        Self {
            gates,
            default_retry_limit,
        }
    }

    pub fn default_retry_limit(&self) -> u32 {
        self.default_retry_limit
    }

    /// Run one round of `profile` for `unit`.
    ///
    /// `scope` is every file the unit modified so far (what the gates look
    /// at); `changed` is what the latest worker dispatch modified (what may
    /// have invalidated earlier passes).
    pub async fn run_round(
        &self,
        unit: &str,
        profile: &GateProfile,
        state: &mut GateState,
        scope: &BTreeSet<String>,
        changed: &BTreeSet<String>,
    ) -> Result<GateRound> {
        let mut round = GateRound {
            results: Vec::new(),
            skipped: Vec::new(),
            outcome: GateOutcome::Passed,
        };

        // Blocking stage.
        for gate in &profile.gate1 {
            if state.is_clean(gate, changed) {
                debug!(unit, gate = %gate, "gate result still valid; skipping");
                round.skipped.push(gate.clone());
                continue;
            }

            let request = self.request(unit, gate, state, scope);
            let execution = execute_gate(self.gates.as_ref(), request).await;
            state.record(&execution.result);
            round.results.push(execution.result.clone());

            if let Some(reason) = execution.malformed {
                round.outcome = GateOutcome::Exhausted(self.malformed_record(gate, reason, state));
                return Ok(round);
            }

            if !execution.result.passed {
                round.outcome = self.after_failure(unit, profile, state, &[gate.as_str()], Stage::Blocking);
                return Ok(round);
            }
        }

        // Parallel stage.
        let pending: Vec<&String> = profile
            .gate2
            .iter()
            .filter(|gate| {
                let clean = state.is_clean(gate, changed);
                if clean {
                    debug!(unit, gate = %gate, "gate result still valid; skipping");
                    round.skipped.push((*gate).clone());
                }
                !clean
            })
            .collect();

        if pending.is_empty() {
            return Ok(round);
        }

        let mut set = JoinSet::new();
        for (pos, gate) in pending.iter().enumerate() {
            let gates = Arc::clone(&self.gates);
            let request = self.request(unit, gate, state, scope);
            set.spawn(async move { (pos, execute_gate(gates.as_ref(), request).await) });
        }

        let mut finished = Vec::with_capacity(pending.len());
        while let Some(joined) = set.join_next().await {
            let (pos, execution) = joined
                .map_err(|e| WorkgateError::Other(anyhow!("gate task for unit '{unit}' failed: {e}")))?;
            finished.push((pos, execution));
        }
        finished.sort_by_key(|(pos, _)| *pos);

        let mut failing: Vec<&str> = Vec::new();
        let mut malformed: Option<(String, String)> = None;

        for (pos, execution) in finished {
            let gate = pending[pos];
            state.record(&execution.result);
            if !execution.result.passed {
                failing.push(gate.as_str());
            }
            if malformed.is_none() {
                malformed = execution.malformed.map(|reason| (gate.clone(), reason));
            }
            round.results.push(execution.result);
        }

        if let Some((gate, reason)) = malformed {
            round.outcome = GateOutcome::Exhausted(self.malformed_record(&gate, reason, state));
        } else if !failing.is_empty() {
            round.outcome = self.after_failure(unit, profile, state, &failing, Stage::Parallel);
        }

        Ok(round)
    }

    fn request(
        &self,
        unit: &str,
        gate: &str,
        state: &GateState,
        scope: &BTreeSet<String>,
    ) -> GateRequest {
        GateRequest {
            gate_name: gate.to_string(),
            unit_id: unit.to_string(),
            files: scope.iter().cloned().collect(),
            attempt: state.attempts(gate) + 1,
        }
    }

    /// Decide between redispatch and escalation once `failing` gates failed.
    fn after_failure(
        &self,
        unit: &str,
        profile: &GateProfile,
        state: &GateState,
        failing: &[&str],
        stage: Stage,
    ) -> GateOutcome {
        for gate in failing {
            let limit = profile.retry_limit(gate, self.default_retry_limit);
            if state.is_exhausted(gate, limit) {
                let history = state.failure_history(gate).to_vec();
                warn!(
                    unit,
                    gate = %gate,
                    limit,
                    attempts = history.len(),
                    "gate retry budget exhausted; escalating"
                );
                return GateOutcome::Exhausted(FailureRecord {
                    kind: FailureKind::RetryExhausted,
                    gate: Some(gate.to_string()),
                    reason: WorkgateError::RetryExhausted {
                        unit: unit.to_string(),
                        gate: gate.to_string(),
                    }
                    .to_string(),
                    history,
                });
            }
        }

        // Union of the latest issues of every failing gate, first seen first.
        let mut issues: Vec<String> = Vec::new();
        for gate in failing {
            if let Some(latest) = state.failure_history(gate).last() {
                for issue in latest {
                    if !issues.contains(issue) {
                        issues.push(issue.clone());
                    }
                }
            }
        }

        info!(unit, gates = ?failing, ?stage, "gate failed; redispatching worker");
        GateOutcome::Redispatch { stage, issues }
    }

    fn malformed_record(&self, gate: &str, reason: String, state: &GateState) -> FailureRecord {
        warn!(gate, %reason, "gate kept answering with malformed reports; escalating");
        FailureRecord {
            kind: FailureKind::ValidationError,
            gate: Some(gate.to_string()),
            reason,
            history: state.failure_history(gate).to_vec(),
        }
    }
}

/// Run one gate attempt. A malformed report, whether the backend rejected
/// the output itself or the report fails the contract, is retried once
/// before it is reported as such; any other backend error is a plain failed
/// attempt.
async fn execute_gate(gates: &dyn GateBackend, request: GateRequest) -> GateExecution {
    let gate = request.gate_name.clone();
    let observed: BTreeSet<String> = request.files.iter().cloned().collect();
    let attempt = request.attempt;

    let mut malformed = None;
    let mut outcome = Err(String::new());

    for try_no in 0..2 {
        let answer = match gates.run_gate(request.clone()).await {
            Ok(value) => GateReport::from_value(value, &gate),
            Err(e) => Err(e),
        };
        match answer {
            Ok(report) => {
                outcome = Ok(report);
                malformed = None;
                break;
            }
            Err(e @ WorkgateError::ValidationError(_)) => {
                warn!(unit = %request.unit_id, gate = %gate, retry = try_no == 0, error = %e, "malformed gate report");
                malformed = Some(e.to_string());
                outcome = Err(e.to_string());
            }
            Err(e) => {
                warn!(unit = %request.unit_id, gate = %gate, error = %e, "gate could not run");
                outcome = Err(format!("gate '{gate}' could not run: {e}"));
                malformed = None;
                break;
            }
        }
    }

    let result = match outcome {
        Ok(report) => {
            let mut issues = report.blocking_issues;
            if !report.all_checks_passed && issues.is_empty() {
                issues.push(format!("gate '{gate}' failed without reporting blocking issues"));
            }
            GateResult {
                gate_name: gate.clone(),
                passed: report.all_checks_passed,
                blocking_issues: issues,
                metrics: report.metrics,
                attempt_number: attempt,
                observed_files: observed,
            }
        }
        Err(issue) => GateResult {
            gate_name: gate.clone(),
            passed: false,
            blocking_issues: vec![issue],
            metrics: BTreeMap::new(),
            attempt_number: attempt,
            observed_files: observed,
        },
    };

    info!(
        unit = %request.unit_id,
        gate = %gate,
        attempt,
        passed = result.passed,
        issues = result.blocking_issues.len(),
        "gate finished"
    );

    GateExecution { result, malformed }
}
