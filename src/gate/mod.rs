// src/gate/mod.rs

//! Quality gates.
//!
//! - [`classify`] tags the files of a changeset with work types.
//! - [`profile`] maps work types to gate profiles and unions them.
//! - [`runner`] executes a profile for one unit and applies retry budgets.

pub mod classify;
pub mod profile;
pub mod runner;

pub use classify::{Classifier, WorkType};
pub use profile::{GateProfile, GateSelector, ProfileTable};
pub use runner::{GateOutcome, GateRound, GateRunner, GateState, Stage};
