// src/dag/mod.rs

//! Dependency graph, plan building and scheduling.
//!
//! - [`graph`] holds the unit dependency graph and cycle detection.
//! - [`builder`] flattens a decomposition into a validated plan.
//! - [`scheduler`] decides which units become ready and which to dispatch.
//! - [`scheduler_step`] defines the result type for scheduler steps.

pub mod builder;
pub mod graph;
pub mod scheduler;
pub mod scheduler_step;

pub use builder::{select_strategy, GraphBuilder, UnitSpec};
pub use graph::DagGraph;
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
