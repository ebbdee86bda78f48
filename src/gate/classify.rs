// src/gate/classify.rs

//! Changeset classification.
//!
//! Each modified file is matched against a static pattern table and tagged
//! with a [`WorkType`]. The first matching rule wins; files no rule matches
//! are application code.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use anyhow::Context;
use regex::RegexSet;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::scope::normalize;

/// Kind of change a file represents. Keys the gate profile table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkType {
    ApplicationCode,
    TestCode,
    Infrastructure,
    SchemaMigration,
    PipelineConfig,
    Documentation,
}

impl WorkType {
    pub const ALL: [WorkType; 6] = [
        WorkType::ApplicationCode,
        WorkType::TestCode,
        WorkType::Infrastructure,
        WorkType::SchemaMigration,
        WorkType::PipelineConfig,
        WorkType::Documentation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WorkType::ApplicationCode => "application-code",
            WorkType::TestCode => "test-code",
            WorkType::Infrastructure => "infrastructure",
            WorkType::SchemaMigration => "schema-migration",
            WorkType::PipelineConfig => "pipeline-config",
            WorkType::Documentation => "documentation",
        }
    }
}

impl fmt::Display for WorkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        WorkType::ALL
            .into_iter()
            .find(|wt| wt.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = WorkType::ALL.iter().map(|wt| wt.as_str()).collect();
                format!("invalid work type: {s} (expected one of {known:?})")
            })
    }
}

/// Pattern table, in priority order.
const RULES: &[(WorkType, &str)] = &[
    (WorkType::PipelineConfig, r"(^|/)\.github/workflows/"),
    (WorkType::PipelineConfig, r"(^|/)\.gitlab-ci\.ya?ml$"),
    (WorkType::PipelineConfig, r"(^|/)\.circleci/"),
    (WorkType::PipelineConfig, r"(^|/)Jenkinsfile$"),
    (WorkType::PipelineConfig, r"(^|/)azure-pipelines\.ya?ml$"),
    (WorkType::SchemaMigration, r"(^|/)migrations?/"),
    (WorkType::SchemaMigration, r"\.sql$"),
    (WorkType::SchemaMigration, r"(^|/)schema\.(prisma|rb)$"),
    (WorkType::TestCode, r"(^|/)(tests?|__tests__|spec)/"),
    (WorkType::TestCode, r"_test\.(go|py|rs)$"),
    (WorkType::TestCode, r"(^|/)test_[^/]+\.py$"),
    (WorkType::TestCode, r"\.(test|spec)\.[cm]?[jt]sx?$"),
    (WorkType::Infrastructure, r"\.tf(vars)?$"),
    (WorkType::Infrastructure, r"(^|/)Dockerfile[^/]*$"),
    (WorkType::Infrastructure, r"(^|/)docker-compose[^/]*\.ya?ml$"),
    (WorkType::Infrastructure, r"(^|/)(k8s|kubernetes|helm|charts|ansible|terraform)/"),
    (WorkType::Documentation, r"\.(md|mdx|rst|adoc)$"),
    (WorkType::Documentation, r"(^|/)docs?/"),
];

/// Compiled pattern table.
#[derive(Debug, Clone)]
pub struct Classifier {
    set: RegexSet,
    tags: Vec<WorkType>,
}

impl Classifier {
    /// Compile a table of `(work type, regex)` rules, first match wins.
    pub fn new(rules: &[(WorkType, &str)]) -> Result<Self> {
        let set = RegexSet::new(rules.iter().map(|(_, pattern)| *pattern))
            .context("compiling classification patterns")?;
        Ok(Self {
            set,
            tags: rules.iter().map(|(tag, _)| *tag).collect(),
        })
    }

    pub fn builtin() -> Result<Self> {
        Self::new(RULES)
    }

    pub fn classify_file(&self, path: &str) -> WorkType {
        self.set
            .matches(&normalize(path))
            .iter()
            .next()
            .map(|idx| self.tags[idx])
            .unwrap_or(WorkType::ApplicationCode)
    }

    /// Distinct work types present in a changeset. An empty changeset is
    /// treated as application code.
    pub fn classify<S: AsRef<str>>(&self, files: &[S]) -> BTreeSet<WorkType> {
        let mut types: BTreeSet<WorkType> = files
            .iter()
            .map(|f| self.classify_file(f.as_ref()))
            .collect();
        if types.is_empty() {
            types.insert(WorkType::ApplicationCode);
        }
        types
    }
}
