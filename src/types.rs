use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Canonical work-unit identifier used throughout the engine.
pub type UnitId = String;

/// Fixed size ceilings every executable unit must respect.
pub const MAX_UNIT_FILES: u32 = 5;
pub const MAX_UNIT_LOC: u32 = 500;
pub const MAX_UNIT_HOURS: f64 = 2.0;

/// Lifecycle state of a single work unit.
///
/// ```text
/// Pending -> Ready -> Dispatched -> GateRunning -> Completed
///    |                                        \-> Failed
///    \-> Skipped
/// ```
///
/// `Completed`, `Failed` and `Skipped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnitStatus {
    Pending,
    Ready,
    Dispatched,
    GateRunning,
    Completed,
    Failed,
    Skipped,
}

impl UnitStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UnitStatus::Completed | UnitStatus::Failed | UnitStatus::Skipped
        )
    }

    /// Whether `self -> to` is an edge of the unit state machine.
    pub fn can_transition_to(self, to: UnitStatus) -> bool {
        use UnitStatus::*;
        matches!(
            (self, to),
            (Pending, Ready)
                | (Pending, Skipped)
                | (Ready, Dispatched)
                | (Dispatched, GateRunning)
                | (GateRunning, Completed)
                | (GateRunning, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UnitStatus::Pending => "pending",
            UnitStatus::Ready => "ready",
            UnitStatus::Dispatched => "dispatched",
            UnitStatus::GateRunning => "gate-running",
            UnitStatus::Completed => "completed",
            UnitStatus::Failed => "failed",
            UnitStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concurrency/isolation mode chosen for a plan at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    SingleUnit,
    SharedBranch,
    IsolatedWorktrees,
}

impl Strategy {
    /// Whether units of a plan with this strategy share one mutable workspace,
    /// which forces strictly serial dispatch.
    pub fn is_shared_workspace(self) -> bool {
        !matches!(self, Strategy::IsolatedWorktrees)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::SingleUnit => "single-unit",
            Strategy::SharedBranch => "shared-branch",
            Strategy::IsolatedWorktrees => "isolated-worktrees",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "single-unit" => Ok(Strategy::SingleUnit),
            "shared-branch" => Ok(Strategy::SharedBranch),
            "isolated-worktrees" => Ok(Strategy::IsolatedWorktrees),
            other => Err(format!(
                "invalid strategy: {other} (expected \"single-unit\", \"shared-branch\" or \"isolated-worktrees\")"
            )),
        }
    }
}

/// State of an issue/unit in the decomposition source (tracker or input file).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceState {
    #[default]
    Open,
    Blocked,
    Closed,
}

/// Grouping label inherited from the nearest ancestor grouping node.
///
/// `group` is used only to permit parallel dispatch and to break ties; it is
/// never a dependency. Displayed as `group.index`, e.g. `1.2`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct GroupNumber {
    pub group: u32,
    pub index: u32,
}

impl GroupNumber {
    pub fn new(group: u32, index: u32) -> Self {
        Self { group, index }
    }
}

impl fmt::Display for GroupNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.index)
    }
}

/// Estimated size of a unit, validated against the fixed ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeMetrics {
    pub files: u32,
    pub loc: u32,
    pub hours: f64,
}

impl SizeMetrics {
    pub fn new(files: u32, loc: u32, hours: f64) -> Self {
        Self { files, loc, hours }
    }

    /// Describe the first ceiling these metrics exceed, if any.
    ///
    /// `declared_files` is the number of scope entries the unit declares; the
    /// larger of it and the estimate is checked.
    pub fn ceiling_violation(&self, declared_files: usize) -> Option<String> {
        let files = (self.files as usize).max(declared_files);
        if files > MAX_UNIT_FILES as usize {
            return Some(format!("{files} files (max {MAX_UNIT_FILES})"));
        }
        if self.loc > MAX_UNIT_LOC {
            return Some(format!("{} LOC (max {MAX_UNIT_LOC})", self.loc));
        }
        if !self.hours.is_finite() || self.hours < 0.0 || self.hours > MAX_UNIT_HOURS {
            return Some(format!("{} hours (max {MAX_UNIT_HOURS})", self.hours));
        }
        None
    }
}
