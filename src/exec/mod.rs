// src/exec/mod.rs

//! Worker and gate execution layer.
//!
//! The engine never does the work itself. It hands a [`DispatchRequest`] to
//! a worker and a [`GateRequest`] to a gate agent, and only trusts the
//! structured JSON they answer with.
//!
//! - [`contract`] defines the request/response contracts and validates
//!   responses.
//! - [`backend`] provides the `WorkerBackend` / `GateBackend` traits the
//!   engine talks to, so tests can swap in fakes.
//! - [`command`] implements both traits by spawning shell commands that read
//!   the request on stdin and print the response on stdout.

use std::future::Future;
use std::pin::Pin;

pub mod backend;
pub mod command;
pub mod contract;

pub use backend::{GateBackend, WorkerBackend};
pub use command::{CommandGates, CommandWorker};
pub use contract::{DispatchRequest, GateReport, GateRequest, WorkerResult};

/// Boxed, sendable future returned by the backend and tracker traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
