// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Variants fall into three families:
//! - structural plan errors, raised by the graph builder before anything is
//!   dispatched (`CyclicDependency`, `OversizedUnit`, ...)
//! - per-unit runtime errors, recovered locally up to a retry budget
//!   (`ValidationError`, `ScopeViolation`, `GateFailure`, `RetryExhausted`)
//! - plan store integrity errors, which always halt the run
//!   (`InvalidTransition`, `CorruptPlan`, `PlanNotFound`)

use thiserror::Error;

use crate::types::UnitStatus;

#[derive(Error, Debug)]
pub enum WorkgateError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Cyclic dependency: {0}")]
    CyclicDependency(String),

    #[error("Unit '{unit}' exceeds size ceiling: {reason}")]
    OversizedUnit { unit: String, reason: String },

    #[error("Unit '{unit}' is blocked by unknown unit '{dep}'")]
    UnknownDependency { unit: String, dep: String },

    #[error("Duplicate unit id: {0}")]
    DuplicateUnit(String),

    #[error("Plan contains no executable units")]
    EmptyPlan,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unit '{unit}' modified files outside its scope: {files:?}")]
    ScopeViolation { unit: String, files: Vec<String> },

    #[error("Gate '{gate}' failed: {issues:?}")]
    GateFailure { gate: String, issues: Vec<String> },

    #[error("Unit '{unit}' exhausted the retry budget of '{gate}'")]
    RetryExhausted { unit: String, gate: String },

    #[error("Invalid transition for unit '{unit}': {from} -> {to} (persisted status is {actual})")]
    InvalidTransition {
        unit: String,
        from: UnitStatus,
        to: UnitStatus,
        actual: UnitStatus,
    },

    #[error("Corrupt plan: {0}")]
    CorruptPlan(String),

    #[error("Plan not found: {0}")]
    PlanNotFound(String),

    #[error("Unit not found: {0}")]
    UnitNotFound(String),

    #[error("Conflicting retry limits for gate '{gate}': {first} vs {second}")]
    ProfileConflict { gate: String, first: u32, second: u32 },

    #[error("Issue not found: {0}")]
    IssueNotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WorkgateError {
    /// Errors that mean the persisted plan can no longer be trusted.
    pub fn is_store_integrity(&self) -> bool {
        matches!(
            self,
            WorkgateError::InvalidTransition { .. }
                | WorkgateError::CorruptPlan(_)
                | WorkgateError::PlanNotFound(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, WorkgateError>;
