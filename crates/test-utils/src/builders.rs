#![allow(dead_code)]

use std::collections::BTreeMap;

use workgate::config::{ConfigFile, ConfigSection, GateCommand, RawConfigFile, WorkerSection};
use workgate::dag::{GraphBuilder, UnitSpec};
use workgate::errors::Result;
use workgate::gate::GateProfile;
use workgate::plan::Plan;
use workgate::types::{SizeMetrics, SourceState, Strategy};

/// Builder for `UnitSpec`.
pub struct UnitSpecBuilder {
    spec: UnitSpec,
}

impl UnitSpecBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            spec: UnitSpec {
                id: id.to_string(),
                title: format!("unit {id}"),
                description: String::new(),
                scope_files: Vec::new(),
                group: None,
                blocked_by: Vec::new(),
                size_metrics: SizeMetrics::new(1, 50, 0.5),
                state: SourceState::Open,
            },
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.spec.title = title.to_string();
        self
    }

    pub fn scope(mut self, files: &[&str]) -> Self {
        self.spec.scope_files = files.iter().map(|f| f.to_string()).collect();
        self.spec.size_metrics.files = files.len() as u32;
        self
    }

    pub fn blocked_by(mut self, dep: &str) -> Self {
        self.spec.blocked_by.push(dep.to_string());
        self
    }

    pub fn group(mut self, group: u32) -> Self {
        self.spec.group = Some(group);
        self
    }

    pub fn size(mut self, files: u32, loc: u32, hours: f64) -> Self {
        self.spec.size_metrics = SizeMetrics::new(files, loc, hours);
        self
    }

    pub fn state(mut self, state: SourceState) -> Self {
        self.spec.state = state;
        self
    }

    pub fn build(self) -> UnitSpec {
        self.spec
    }
}

/// Builder for validated `Plan`s from flat unit specs.
pub struct PlanBuilder {
    name: String,
    units: Vec<UnitSpec>,
}

impl PlanBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            units: Vec::new(),
        }
    }

    pub fn unit(mut self, spec: UnitSpecBuilder) -> Self {
        self.units.push(spec.build());
        self
    }

    pub fn try_build(self) -> Result<Plan> {
        GraphBuilder::new(self.name).from_units(self.units)
    }

    pub fn build(self) -> Plan {
        self.try_build().expect("Failed to build valid plan from builder")
    }

    /// Build, then force a strategy regardless of what the builder picked.
    pub fn build_with_strategy(self, strategy: Strategy) -> Plan {
        let name = self.name.clone();
        let plan = self.build();
        Plan::new(name, strategy, plan.units().to_vec()).expect("plan units stay unique")
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                worker: None,
                gate: BTreeMap::new(),
                profile: BTreeMap::new(),
            },
        }
    }

    pub fn max_parallel(mut self, n: usize) -> Self {
        self.config.config.max_parallel = n;
        self
    }

    pub fn worker_retry_limit(mut self, n: u32) -> Self {
        self.config.config.worker_retry_limit = n;
        self
    }

    pub fn default_gate_retry_limit(mut self, n: u32) -> Self {
        self.config.config.default_gate_retry_limit = n;
        self
    }

    pub fn worker(mut self, cmd: &str) -> Self {
        self.config.worker = Some(WorkerSection {
            cmd: cmd.to_string(),
            restriction: "only modify files inside scopeFiles".to_string(),
        });
        self
    }

    pub fn gate(mut self, name: &str, cmd: &str) -> Self {
        self.config.gate.insert(
            name.to_string(),
            GateCommand {
                cmd: cmd.to_string(),
            },
        );
        self
    }

    pub fn profile(mut self, work_type: &str, profile: GateProfile) -> Self {
        self.config.profile.insert(work_type.to_string(), profile);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
