// src/engine/operator.rs

//! Operations an operator runs against a stored plan outside the control loop.

use tracing::info;

use crate::errors::{Result, WorkgateError};
use crate::plan::{PlanStore, UnitNote};
use crate::types::{UnitId, UnitStatus};

/// Skip a unit that has not been dispatched yet, and every pending unit that
/// transitively depends on it.
///
/// Returns the skipped ids, `unit` first. Only `Pending` units can be
/// skipped; anything else is an `InvalidTransition`.
pub fn skip_unit<S: PlanStore>(store: &mut S, unit: &str, reason: &str) -> Result<Vec<UnitId>> {
    let plan = store.load()?;
    if !plan.contains(unit) {
        return Err(WorkgateError::UnitNotFound(unit.to_string()));
    }

    store.record_transition_with(
        unit,
        UnitStatus::Pending,
        UnitStatus::Skipped,
        &[UnitNote::SkipReason(reason.to_string())],
    )?;

    let mut skipped = vec![unit.to_string()];
    for dependent in plan.pending_dependents(unit) {
        store.record_transition_with(
            &dependent,
            UnitStatus::Pending,
            UnitStatus::Skipped,
            &[UnitNote::SkipReason(format!(
                "upstream unit '{unit}' ended skipped"
            ))],
        )?;
        skipped.push(dependent);
    }

    info!(plan = %store.plan_ref(), units = ?skipped, "skipped units");
    Ok(skipped)
}
