// src/exec/backend.rs

//! Pluggable worker / gate backends.
//!
//! The engine talks to a `WorkerBackend` and a `GateBackend` instead of
//! spawning processes itself. Production uses the command-backed
//! implementations in [`super::command`]; tests provide fakes that answer
//! from a script and record what they were asked.
//!
//! Both traits return the raw JSON response. Validating it against the
//! contract is the engine's job, so a fake can just as easily answer with
//! garbage to exercise the malformed-response path.

use crate::errors::Result;
use crate::exec::contract::{DispatchRequest, GateRequest};
use crate::exec::BoxFuture;

/// Executes units of work.
///
/// An `Err` means the worker could not produce an answer at all (crashed,
/// timed out by external policy, ...). It is retried like any other worker
/// failure.
pub trait WorkerBackend: Send + Sync {
    fn dispatch(&self, request: DispatchRequest) -> BoxFuture<'_, Result<serde_json::Value>>;
}

/// Executes quality gates.
///
/// An `Err` counts as a failed attempt of that gate.
pub trait GateBackend: Send + Sync {
    fn run_gate(&self, request: GateRequest) -> BoxFuture<'_, Result<serde_json::Value>>;
}
