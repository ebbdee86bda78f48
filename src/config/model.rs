// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::errors::Result;
use crate::gate::classify::Classifier;
use crate::gate::profile::{GateProfile, GateSelector, ProfileTable};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [config]
/// plan_dir = ".workgate"
/// max_parallel = 4
///
/// [worker]
/// cmd = "agent --json"
///
/// [gate.test-execution]
/// cmd = "gate-tests"
///
/// [profile.application-code]
/// gate1 = ["test-execution"]
/// gate2 = ["code-review"]
/// retry_limits = { test-execution = 3 }
/// ```
///
/// All sections are optional. Use [`ConfigFile::try_from`] to get a
/// validated [`ConfigFile`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub worker: Option<WorkerSection>,

    /// Gate commands from `[gate.<name>]`.
    #[serde(default)]
    pub gate: BTreeMap<String, GateCommand>,

    /// Profile overrides from `[profile.<work-type>]`.
    #[serde(default)]
    pub profile: BTreeMap<String, GateProfile>,
}

/// Validated configuration.
///
/// Built from a [`RawConfigFile`] via `TryFrom`; the profile overrides have
/// already been merged into `profiles`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub worker: Option<WorkerSection>,
    pub gate: BTreeMap<String, GateCommand>,
    pub profiles: ProfileTable,
}

impl ConfigFile {
    /// Assemble a config without validation. Prefer `ConfigFile::try_from`.
    pub fn new_unchecked(
        config: ConfigSection,
        worker: Option<WorkerSection>,
        gate: BTreeMap<String, GateCommand>,
        profiles: ProfileTable,
    ) -> Self {
        Self {
            config,
            worker,
            gate,
            profiles,
        }
    }

    /// Builds the classifier + profile table used to pick gates.
    pub fn gate_selector(&self) -> Result<GateSelector> {
        Ok(GateSelector::new(Classifier::builtin()?, self.profiles.clone()))
    }

    /// Gate name -> command.
    pub fn gate_commands(&self) -> BTreeMap<String, String> {
        self.gate
            .iter()
            .map(|(name, gate)| (name.clone(), gate.cmd.clone()))
            .collect()
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        let config = ConfigSection::default();
        let profiles =
            ProfileTable::builtin().with_default_retry_limit(config.default_gate_retry_limit);
        Self::new_unchecked(config, None, BTreeMap::new(), profiles)
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Directory plans are persisted in.
    #[serde(default = "default_plan_dir")]
    pub plan_dir: PathBuf,

    /// Maximum number of units in flight at once. Only the
    /// `isolated-worktrees` strategy ever runs more than one.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Redispatches allowed after a worker failure or scope violation.
    #[serde(default = "default_worker_retry_limit")]
    pub worker_retry_limit: u32,

    /// Retries for gates whose profile sets no explicit limit.
    #[serde(default = "default_gate_retry_limit")]
    pub default_gate_retry_limit: u32,

    /// Passed to every worker dispatch as `qualityTargets`.
    #[serde(default)]
    pub quality_targets: Vec<String>,
}

fn default_plan_dir() -> PathBuf {
    PathBuf::from(".workgate")
}

fn default_max_parallel() -> usize {
    4
}

fn default_worker_retry_limit() -> u32 {
    2
}

fn default_gate_retry_limit() -> u32 {
    1
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            plan_dir: default_plan_dir(),
            max_parallel: default_max_parallel(),
            worker_retry_limit: default_worker_retry_limit(),
            default_gate_retry_limit: default_gate_retry_limit(),
            quality_targets: Vec::new(),
        }
    }
}

/// `[worker]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSection {
    /// Reads a `DispatchRequest` on stdin, prints a `WorkerResult` on stdout.
    pub cmd: String,

    /// Sent to the worker as `restriction`.
    #[serde(default = "default_restriction")]
    pub restriction: String,
}

fn default_restriction() -> String {
    "only modify files inside scopeFiles".to_string()
}

/// `[gate.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct GateCommand {
    /// Reads a `GateRequest` on stdin, prints a `GateReport` on stdout.
    pub cmd: String,
}
