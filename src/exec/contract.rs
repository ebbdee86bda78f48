// src/exec/contract.rs

//! JSON contracts between the engine and its workers / gate agents.
//!
//! Responses arrive as untyped `serde_json::Value`s and are only accepted
//! once every required field is present with the right type. Anything else
//! is a `ValidationError`; it is never treated as a pass.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, WorkgateError};
use crate::types::UnitId;

/// What a worker receives when a unit is dispatched to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    pub unit_id: UnitId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub scope_files: Vec<String>,
    pub restriction: String,
    pub quality_targets: Vec<String>,
    /// Issues the worker must fix on a redispatch. Empty on the first attempt.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocking_issues: Vec<String>,
    /// 1-based dispatch counter for this unit within the current run.
    pub attempt: u32,
}

/// What a worker must answer with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerResult {
    pub files_modified: Vec<String>,
    pub validation_passed: bool,
    pub narrative_summary: String,
}

impl WorkerResult {
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        if !value.is_object() {
            return Err(WorkgateError::ValidationError(format!(
                "worker result must be a JSON object, got {value}"
            )));
        }
        serde_json::from_value(value).map_err(|e| {
            WorkgateError::ValidationError(format!("malformed worker result: {e}"))
        })
    }
}

/// What a gate agent receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateRequest {
    pub gate_name: String,
    pub unit_id: UnitId,
    /// Files the gate should look at: everything the unit has modified so far.
    pub files: Vec<String>,
    /// 1-based attempt number of this gate for this unit.
    pub attempt: u32,
}

/// What a gate agent must answer with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateReport {
    pub gate_name: String,
    pub all_checks_passed: bool,
    pub blocking_issues: Vec<String>,
    pub metrics: BTreeMap<String, serde_json::Value>,
}

impl GateReport {
    /// Parse a gate response and check it answers for `expected_gate`.
    pub fn from_value(value: serde_json::Value, expected_gate: &str) -> Result<Self> {
        if !value.is_object() {
            return Err(WorkgateError::ValidationError(format!(
                "report from gate '{expected_gate}' must be a JSON object, got {value}"
            )));
        }
        let report: GateReport = serde_json::from_value(value).map_err(|e| {
            WorkgateError::ValidationError(format!(
                "malformed report from gate '{expected_gate}': {e}"
            ))
        })?;

        if report.gate_name != expected_gate {
            return Err(WorkgateError::ValidationError(format!(
                "gate '{expected_gate}' answered as '{}'",
                report.gate_name
            )));
        }

        Ok(report)
    }
}
