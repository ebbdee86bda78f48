// src/plan/store.rs

//! Durable plan storage.
//!
//! A plan is persisted as a single JSON document: the unit table, the
//! dependency edge list derived from it, the strategy tag and a blake3
//! checksum over the unit table. Saves go to a temp file first and are then
//! renamed over the previous version, so a reader only ever sees a complete
//! document.
//!
//! Every status change goes through [`PlanStore::record_transition`], which
//! re-reads the persisted plan and refuses the change unless the unit is
//! still in the expected state.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{Result, WorkgateError};
use crate::fs::{FileSystem, RealFileSystem};
use crate::plan::unit::{UnitNote, WorkUnit};
use crate::plan::Plan;
use crate::types::{Strategy, UnitId, UnitStatus};

/// Version of the persisted plan document.
pub const PLAN_FORMAT_VERSION: u32 = 1;

/// Abstract storage for one plan.
pub trait PlanStore: Send {
    /// Name of the plan this store is bound to.
    fn plan_ref(&self) -> &str;

    /// Write the full plan. Never leaves a partially written document behind.
    fn save(&mut self, plan: &Plan) -> Result<()>;

    /// Read the plan back, failing with `PlanNotFound` or `CorruptPlan`.
    fn load(&self) -> Result<Plan>;

    /// Move a finished plan out of the active location.
    fn archive(&mut self) -> Result<()>;

    fn record_transition(&mut self, unit: &str, from: UnitStatus, to: UnitStatus) -> Result<()> {
        self.record_transition_with(unit, from, to, &[])
    }

    /// Transition plus notes, committed in one save.
    fn record_transition_with(
        &mut self,
        unit: &str,
        from: UnitStatus,
        to: UnitStatus,
        notes: &[UnitNote],
    ) -> Result<()> {
        let mut plan = self.load()?;
        plan.apply_transition(unit, from, to)?;
        plan.apply_notes(unit, notes)?;
        self.save(&plan)?;
        debug!(plan = %self.plan_ref(), unit = %unit, %from, %to, "recorded transition");
        Ok(())
    }

    /// Attach notes (gate results, modified files, ...) without a status change.
    fn annotate(&mut self, unit: &str, notes: &[UnitNote]) -> Result<()> {
        let mut plan = self.load()?;
        plan.apply_notes(unit, notes)?;
        self.save(&plan)
    }
}

/// A dependency edge in the persisted layout: `from` blocks `to`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub from: UnitId,
    pub to: UnitId,
}

/// On-disk representation of a [`Plan`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDocument {
    pub version: u32,
    pub name: String,
    pub strategy: Strategy,
    pub units: Vec<WorkUnit>,
    pub edges: Vec<Edge>,
    pub checksum: String,
}

impl PlanDocument {
    pub fn from_plan(plan: &Plan) -> Result<Self> {
        let units = plan.units().to_vec();
        let mut edges: Vec<Edge> = plan
            .edges()
            .into_iter()
            .map(|(from, to)| Edge { from, to })
            .collect();
        edges.sort();
        let checksum = units_checksum(&units)?;

        Ok(Self {
            version: PLAN_FORMAT_VERSION,
            name: plan.name().to_string(),
            strategy: plan.strategy(),
            units,
            edges,
            checksum,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| WorkgateError::CorruptPlan(format!("unparseable plan document: {e}")))
    }

    /// Rebuild the plan, verifying the document is internally consistent.
    pub fn into_plan(self) -> Result<Plan> {
        if self.version != PLAN_FORMAT_VERSION {
            return Err(WorkgateError::CorruptPlan(format!(
                "unsupported plan version {} (expected {PLAN_FORMAT_VERSION})",
                self.version
            )));
        }

        let actual = units_checksum(&self.units)?;
        if actual != self.checksum {
            return Err(WorkgateError::CorruptPlan(format!(
                "checksum mismatch for plan '{}'",
                self.name
            )));
        }

        let plan = Plan::new(self.name, self.strategy, self.units).map_err(|e| match e {
            WorkgateError::DuplicateUnit(id) => {
                WorkgateError::CorruptPlan(format!("duplicate unit id '{id}'"))
            }
            other => other,
        })?;

        let mut derived: Vec<Edge> = plan
            .edges()
            .into_iter()
            .map(|(from, to)| Edge { from, to })
            .collect();
        derived.sort();
        let mut stored = self.edges;
        stored.sort();
        if derived != stored {
            return Err(WorkgateError::CorruptPlan(
                "edge list does not match unit dependencies".to_string(),
            ));
        }

        if let Some((from, to)) = plan
            .edges()
            .into_iter()
            .find(|(from, _)| !plan.contains(from))
        {
            return Err(WorkgateError::CorruptPlan(format!(
                "unit '{to}' depends on missing unit '{from}'"
            )));
        }

        Ok(plan)
    }
}

fn units_checksum(units: &[WorkUnit]) -> Result<String> {
    let bytes = serde_json::to_vec(units)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

/// Stores plans as `<dir>/<name>.json`, archived to `<dir>/archive/`.
#[derive(Debug)]
pub struct FilePlanStore<F: FileSystem = RealFileSystem> {
    fs: F,
    dir: PathBuf,
    name: String,
}

impl FilePlanStore<RealFileSystem> {
    pub fn on_disk(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self::new(RealFileSystem, dir, name)
    }
}

impl<F: FileSystem> FilePlanStore<F> {
    /// Bind a store to plan `name` under `dir`.
    ///
    /// A temp file left behind by an interrupted save is discarded; the last
    /// complete document stays authoritative.
    pub fn new(fs: F, dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        let store = Self {
            fs,
            dir: dir.into(),
            name: name.into(),
        };

        let tmp = store.tmp_path();
        if store.fs.exists(&tmp) {
            warn!(path = ?tmp, "removing interrupted plan write");
            if let Err(e) = store.fs.remove_file(&tmp) {
                warn!(path = ?tmp, error = %e, "failed to remove interrupted plan write");
            }
        }

        store
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.name))
    }

    fn tmp_path(&self) -> PathBuf {
        self.dir.join(format!("{}.json.tmp", self.name))
    }

    fn archive_path(&self) -> PathBuf {
        let archive_dir = self.dir.join("archive");
        let first = archive_dir.join(format!("{}.json", self.name));
        if !self.fs.exists(&first) {
            return first;
        }
        let mut n = 1;
        loop {
            let candidate = archive_dir.join(format!("{}.{n}.json", self.name));
            if !self.fs.exists(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn exists(&self) -> bool {
        self.fs.exists(&self.path())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl<F: FileSystem> PlanStore for FilePlanStore<F> {
    fn plan_ref(&self) -> &str {
        &self.name
    }

    fn save(&mut self, plan: &Plan) -> Result<()> {
        let json = PlanDocument::from_plan(plan)?.to_json()?;
        let path = self.path();
        let tmp = self.tmp_path();

        self.fs.write(&tmp, json.as_bytes())?;
        self.fs
            .rename(&tmp, &path)
            .with_context(|| format!("committing plan '{}'", self.name))?;

        debug!(plan = %self.name, path = ?path, "plan saved");
        Ok(())
    }

    fn load(&self) -> Result<Plan> {
        let path = self.path();
        if !self.fs.exists(&path) {
            return Err(WorkgateError::PlanNotFound(self.name.clone()));
        }

        let text = self.fs.read_to_string(&path)?;
        PlanDocument::from_json(&text)?.into_plan()
    }

    fn archive(&mut self) -> Result<()> {
        let plan = self.load()?;
        if !plan.is_finished() {
            return Err(WorkgateError::ValidationError(format!(
                "plan '{}' still has {} unit(s) requiring work",
                self.name,
                plan.non_terminal_ids().len()
            )));
        }

        let target = self.archive_path();
        self.fs.rename(&self.path(), &target)?;
        info!(plan = %self.name, path = ?target, "plan archived");
        Ok(())
    }
}

/// Keeps the serialized plan in memory; used by tests and dry runs.
///
/// Goes through the same JSON document as the file store so round-trip
/// behaviour is identical.
#[derive(Debug, Default)]
pub struct MemoryPlanStore {
    name: String,
    document: Option<String>,
    archived: Vec<String>,
    saves: usize,
}

impl MemoryPlanStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Number of successful saves so far.
    pub fn saves(&self) -> usize {
        self.saves
    }

    pub fn archived(&self) -> &[String] {
        &self.archived
    }
}

impl PlanStore for MemoryPlanStore {
    fn plan_ref(&self) -> &str {
        &self.name
    }

    fn save(&mut self, plan: &Plan) -> Result<()> {
        self.document = Some(PlanDocument::from_plan(plan)?.to_json()?);
        self.saves += 1;
        Ok(())
    }

    fn load(&self) -> Result<Plan> {
        match &self.document {
            Some(text) => PlanDocument::from_json(text)?.into_plan(),
            None => Err(WorkgateError::PlanNotFound(self.name.clone())),
        }
    }

    fn archive(&mut self) -> Result<()> {
        let plan = self.load()?;
        if !plan.is_finished() {
            return Err(WorkgateError::ValidationError(format!(
                "plan '{}' still has {} unit(s) requiring work",
                self.name,
                plan.non_terminal_ids().len()
            )));
        }
        if let Some(doc) = self.document.take() {
            self.archived.push(doc);
        }
        info!(plan = %self.name, "plan archived (memory)");
        Ok(())
    }
}
