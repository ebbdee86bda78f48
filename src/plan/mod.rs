// src/plan/mod.rs

//! The executable plan: a flat table of work units plus the strategy picked
//! when it was built.
//!
//! - [`unit`] defines [`WorkUnit`] and the records attached to it.
//! - [`store`] persists plans and validates every status transition against
//!   the persisted copy.
//!
//! Units live in one `Vec` in declaration order; an id -> position index is
//! kept alongside. Dependencies are plain id references (`blocked_by`), so
//! there is no pointer graph to keep consistent.

pub mod store;
pub mod unit;

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use tracing::{debug, warn};

use crate::errors::{Result, WorkgateError};
use crate::types::{Strategy, UnitId, UnitStatus};

pub use store::{FilePlanStore, MemoryPlanStore, PlanStore};
pub use unit::{FailureKind, FailureRecord, GateResult, UnitNote, WorkUnit};

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    name: String,
    strategy: Strategy,
    units: Vec<WorkUnit>,
    index: HashMap<UnitId, usize>,
}

impl Plan {
    /// Assemble a plan from units in declaration order.
    ///
    /// Only checks id uniqueness; structural validation (cycles, size,
    /// unknown references) is the graph builder's job.
    pub fn new(name: impl Into<String>, strategy: Strategy, units: Vec<WorkUnit>) -> Result<Self> {
        let mut index = HashMap::with_capacity(units.len());
        for (pos, unit) in units.iter().enumerate() {
            if index.insert(unit.id.clone(), pos).is_some() {
                return Err(WorkgateError::DuplicateUnit(unit.id.clone()));
            }
        }

        Ok(Self {
            name: name.into(),
            strategy,
            units,
            index,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Units in declaration order.
    pub fn units(&self) -> &[WorkUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn unit(&self, id: &str) -> Option<&WorkUnit> {
        self.index.get(id).map(|&pos| &self.units[pos])
    }

    pub fn unit_mut(&mut self, id: &str) -> Option<&mut WorkUnit> {
        match self.index.get(id) {
            Some(&pos) => Some(&mut self.units[pos]),
            None => None,
        }
    }

    /// Declaration position of a unit (used for deterministic tie-breaks).
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn status_of(&self, id: &str) -> Option<UnitStatus> {
        self.unit(id).map(|u| u.status)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Ids of units still requiring work, in declaration order.
    pub fn non_terminal_ids(&self) -> Vec<UnitId> {
        self.units
            .iter()
            .filter(|u| !u.is_terminal())
            .map(|u| u.id.clone())
            .collect()
    }

    /// `true` once every unit is `Completed`, `Failed` or `Skipped`.
    pub fn is_finished(&self) -> bool {
        self.units.iter().all(WorkUnit::is_terminal)
    }

    pub fn ids_with_status(&self, status: UnitStatus) -> Vec<UnitId> {
        self.units
            .iter()
            .filter(|u| u.status == status)
            .map(|u| u.id.clone())
            .collect()
    }

    pub fn status_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for unit in &self.units {
            *counts.entry(unit.status.to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// Dependency edges as `(blocker, blocked)` pairs.
    pub fn edges(&self) -> Vec<(UnitId, UnitId)> {
        self.units
            .iter()
            .flat_map(|u| u.blocked_by.iter().map(|dep| (dep.clone(), u.id.clone())))
            .collect()
    }

    /// Units that list `id` in their `blocked_by`, in declaration order.
    pub fn dependents_of(&self, id: &str) -> Vec<UnitId> {
        self.units
            .iter()
            .filter(|u| u.blocked_by.contains(id))
            .map(|u| u.id.clone())
            .collect()
    }

    /// Apply a status transition after checking both the expected current
    /// status and the state machine.
    pub fn apply_transition(&mut self, id: &str, from: UnitStatus, to: UnitStatus) -> Result<()> {
        let unit = self
            .unit_mut(id)
            .ok_or_else(|| WorkgateError::UnitNotFound(id.to_string()))?;

        if unit.status != from || !from.can_transition_to(to) {
            return Err(WorkgateError::InvalidTransition {
                unit: id.to_string(),
                from,
                to,
                actual: unit.status,
            });
        }

        debug!(unit = %id, %from, %to, "unit transition");
        unit.status = to;
        Ok(())
    }

    /// Apply notes to a unit without changing its status.
    pub fn apply_notes(&mut self, id: &str, notes: &[UnitNote]) -> Result<()> {
        let unit = self
            .unit_mut(id)
            .ok_or_else(|| WorkgateError::UnitNotFound(id.to_string()))?;
        for note in notes {
            note.apply(unit);
        }
        Ok(())
    }

    /// Pending units that transitively depend on `origin`, in breadth-first
    /// order. Used to retire work that can no longer become ready.
    pub fn pending_dependents(&self, origin: &str) -> Vec<UnitId> {
        let mut out = Vec::new();
        let mut seen: HashSet<UnitId> = HashSet::new();
        let mut queue: VecDeque<UnitId> = self.dependents_of(origin).into();

        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if self.status_of(&id) == Some(UnitStatus::Pending) {
                queue.extend(self.dependents_of(&id));
                out.push(id);
            }
        }

        out
    }

    /// Reset units interrupted mid-flight (`Dispatched`/`GateRunning`) back
    /// to `Ready`. `Completed` units are never touched.
    ///
    /// Returns the ids that were requeued.
    pub fn requeue_interrupted(&mut self) -> Vec<UnitId> {
        let mut requeued = Vec::new();
        for unit in &mut self.units {
            if matches!(unit.status, UnitStatus::Dispatched | UnitStatus::GateRunning) {
                warn!(
                    unit = %unit.id,
                    status = %unit.status,
                    "unit was in flight when the previous run stopped; requeueing"
                );
                unit.status = UnitStatus::Ready;
                requeued.push(unit.id.clone());
            }
        }
        requeued
    }
}
