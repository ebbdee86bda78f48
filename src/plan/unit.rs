// src/plan/unit.rs

//! Work units and the records attached to them while they run.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::{GroupNumber, SizeMetrics, UnitId, UnitStatus};

/// An atomic, independently dispatchable piece of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkUnit {
    pub id: UnitId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Declared file/module boundaries. Fixed once the plan is built.
    #[serde(default)]
    pub scope_files: Vec<String>,
    /// Files the worker has modified so far, accumulated across attempts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_modified: Vec<String>,
    pub group_number: GroupNumber,
    #[serde(default)]
    pub blocked_by: BTreeSet<UnitId>,
    pub status: UnitStatus,
    #[serde(default)]
    pub size_metrics: SizeMetrics,
    /// Every gate attempt made for this unit, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gate_results: Vec<GateResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

impl WorkUnit {
    pub fn new(id: impl Into<UnitId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            scope_files: Vec::new(),
            files_modified: Vec::new(),
            group_number: GroupNumber::default(),
            blocked_by: BTreeSet::new(),
            status: UnitStatus::Pending,
            size_metrics: SizeMetrics::default(),
            gate_results: Vec::new(),
            failure: None,
            skip_reason: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Most recent passing result of `gate`, if any.
    pub fn last_pass(&self, gate: &str) -> Option<&GateResult> {
        self.gate_results
            .iter()
            .rev()
            .find(|r| r.gate_name == gate && r.passed)
    }
}

/// Immutable record of one gate execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateResult {
    pub gate_name: String,
    pub passed: bool,
    #[serde(default)]
    pub blocking_issues: Vec<String>,
    #[serde(default)]
    pub metrics: BTreeMap<String, serde_json::Value>,
    pub attempt_number: u32,
    /// Files the gate looked at; used to decide whether a later change makes
    /// a passing result stale.
    #[serde(default)]
    pub observed_files: BTreeSet<String>,
}

/// Why a unit ended up `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// A gate ran out of retries.
    RetryExhausted,
    /// The worker kept answering with a malformed result.
    ValidationError,
    /// The worker kept failing or touching files outside its scope.
    WorkerFailure,
}

/// Escalation payload kept on a failed unit for the human operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub kind: FailureKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<String>,
    pub reason: String,
    /// Blocking issues of every failing attempt, in attempt order.
    #[serde(default)]
    pub history: Vec<Vec<String>>,
}

/// Non-status detail committed alongside (or separately from) a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitNote {
    /// Append gate attempts to the unit's history.
    GateResults(Vec<GateResult>),
    /// Replace the unit's accumulated set of modified files.
    FilesModified(Vec<String>),
    Failure(FailureRecord),
    SkipReason(String),
}

impl UnitNote {
    pub fn apply(&self, unit: &mut WorkUnit) {
        match self {
            UnitNote::GateResults(results) => unit.gate_results.extend(results.iter().cloned()),
            UnitNote::FilesModified(files) => unit.files_modified = files.clone(),
            UnitNote::Failure(record) => unit.failure = Some(record.clone()),
            UnitNote::SkipReason(reason) => unit.skip_reason = Some(reason.clone()),
        }
    }
}
