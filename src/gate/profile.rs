// src/gate/profile.rs

//! Gate profiles and profile selection.
//!
//! A profile lists the blocking gates (`gate1`, run one after another) and
//! the parallel gates (`gate2`, run together once `gate1` passed) required
//! for a work type, plus per-gate retry limits. A changeset spanning several
//! work types gets the union of their profiles.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{Result, WorkgateError};
use crate::gate::classify::{Classifier, WorkType};

/// Gates required for a classified changeset.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GateProfile {
    #[serde(default)]
    pub gate1: Vec<String>,
    #[serde(default)]
    pub gate2: Vec<String>,
    /// Retries granted to a gate after its first failing attempt.
    #[serde(default)]
    pub retry_limits: BTreeMap<String, u32>,
}

impl GateProfile {
    pub fn new<S: Into<String>>(
        gate1: impl IntoIterator<Item = S>,
        gate2: impl IntoIterator<Item = S>,
        retry_limits: impl IntoIterator<Item = (S, u32)>,
    ) -> Self {
        Self {
            gate1: gate1.into_iter().map(Into::into).collect(),
            gate2: gate2.into_iter().map(Into::into).collect(),
            retry_limits: retry_limits
                .into_iter()
                .map(|(name, limit)| (name.into(), limit))
                .collect(),
        }
    }

    /// Every gate in the profile, blocking stage first.
    pub fn gates(&self) -> impl Iterator<Item = &str> {
        self.gate1.iter().chain(self.gate2.iter()).map(String::as_str)
    }

    pub fn is_blocking(&self, gate: &str) -> bool {
        self.gate1.iter().any(|g| g == gate)
    }

    pub fn retry_limit(&self, gate: &str, default: u32) -> u32 {
        self.retry_limits.get(gate).copied().unwrap_or(default)
    }

    /// Union of several profiles.
    ///
    /// `gate1` keeps every blocking gate in first-seen order. `gate2` keeps
    /// every parallel gate that is not already blocking somewhere. Two
    /// profiles disagreeing on a gate's retry limit is a `ProfileConflict`.
    pub fn union<'a>(profiles: impl IntoIterator<Item = &'a GateProfile>) -> Result<GateProfile> {
        let profiles: Vec<&GateProfile> = profiles.into_iter().collect();
        let mut out = GateProfile::default();

        for profile in &profiles {
            for gate in &profile.gate1 {
                if !out.gate1.contains(gate) {
                    out.gate1.push(gate.clone());
                }
            }
        }

        for profile in &profiles {
            for gate in &profile.gate2 {
                if !out.gate1.contains(gate) && !out.gate2.contains(gate) {
                    out.gate2.push(gate.clone());
                }
            }

            for (gate, &limit) in &profile.retry_limits {
                match out.retry_limits.get(gate) {
                    Some(&existing) if existing != limit => {
                        return Err(WorkgateError::ProfileConflict {
                            gate: gate.clone(),
                            first: existing,
                            second: limit,
                        });
                    }
                    Some(_) => {}
                    None => {
                        out.retry_limits.insert(gate.clone(), limit);
                    }
                }
            }
        }

        Ok(out)
    }
}

/// Static work type -> profile table.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileTable {
    profiles: BTreeMap<WorkType, GateProfile>,
    default_retry_limit: u32,
}

impl ProfileTable {
    /// The built-in table. Test execution gets the most retries; security
    /// and validation style gates get one.
    pub fn builtin() -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert(
            WorkType::ApplicationCode,
            GateProfile::new(
                ["test-execution"],
                ["code-review", "security-scan"],
                [("test-execution", 3), ("code-review", 2), ("security-scan", 1)],
            ),
        );
        profiles.insert(
            WorkType::TestCode,
            GateProfile::new(
                ["test-execution"],
                ["code-review"],
                [("test-execution", 3), ("code-review", 2)],
            ),
        );
        profiles.insert(
            WorkType::Infrastructure,
            GateProfile::new(
                ["infra-validation"],
                ["security-scan", "code-review"],
                [("infra-validation", 2), ("security-scan", 1), ("code-review", 2)],
            ),
        );
        profiles.insert(
            WorkType::SchemaMigration,
            GateProfile::new(
                ["migration-check", "test-execution"],
                ["code-review"],
                [("migration-check", 1), ("test-execution", 3), ("code-review", 2)],
            ),
        );
        profiles.insert(
            WorkType::PipelineConfig,
            GateProfile::new(
                ["pipeline-lint"],
                ["security-scan"],
                [("pipeline-lint", 2), ("security-scan", 1)],
            ),
        );
        profiles.insert(
            WorkType::Documentation,
            GateProfile::new(Vec::<&str>::new(), vec!["doc-review"], [("doc-review", 1)]),
        );

        Self {
            profiles,
            default_retry_limit: 1,
        }
    }

    pub fn with_default_retry_limit(mut self, limit: u32) -> Self {
        self.default_retry_limit = limit;
        self
    }

    /// Replace the profile of one work type.
    pub fn set_profile(&mut self, work_type: WorkType, profile: GateProfile) {
        self.profiles.insert(work_type, profile);
    }

    pub fn profile(&self, work_type: WorkType) -> Option<&GateProfile> {
        self.profiles.get(&work_type)
    }

    pub fn default_retry_limit(&self) -> u32 {
        self.default_retry_limit
    }

    /// Every gate name any profile refers to.
    pub fn gate_names(&self) -> BTreeSet<String> {
        self.profiles
            .values()
            .flat_map(|p| p.gates().map(str::to_string))
            .collect()
    }

    /// Reject tables where two profiles disagree on a gate's retry limit, so
    /// no changeset can ever hit a conflict at run time.
    pub fn validate(&self) -> Result<()> {
        GateProfile::union(self.profiles.values()).map(|_| ())
    }

    /// Union of the profiles of `work_types`.
    pub fn select(&self, work_types: &BTreeSet<WorkType>) -> Result<GateProfile> {
        let profiles = work_types
            .iter()
            .map(|wt| {
                self.profiles.get(wt).ok_or_else(|| {
                    WorkgateError::ConfigError(format!("no gate profile for work type '{wt}'"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        match profiles.as_slice() {
            [single] => Ok((*single).clone()),
            many => GateProfile::union(many.iter().copied()),
        }
    }
}

/// Classifier plus profile table: changeset in, gate profile out.
#[derive(Debug, Clone)]
pub struct GateSelector {
    classifier: Classifier,
    table: ProfileTable,
}

impl GateSelector {
    pub fn new(classifier: Classifier, table: ProfileTable) -> Self {
        Self { classifier, table }
    }

    pub fn builtin() -> Result<Self> {
        Ok(Self::new(Classifier::builtin()?, ProfileTable::builtin()))
    }

    pub fn table(&self) -> &ProfileTable {
        &self.table
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn select<S: AsRef<str>>(&self, files: &[S]) -> Result<(BTreeSet<WorkType>, GateProfile)> {
        let work_types = self.classifier.classify(files);
        let profile = self.table.select(&work_types)?;
        debug!(
            work_types = ?work_types,
            gate1 = ?profile.gate1,
            gate2 = ?profile.gate2,
            "selected gate profile"
        );
        Ok((work_types, profile))
    }
}
