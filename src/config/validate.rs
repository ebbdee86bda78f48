// src/config/validate.rs

use std::str::FromStr;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, WorkgateError};
use crate::gate::classify::WorkType;
use crate::gate::profile::ProfileTable;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::WorkgateError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_global_config(&raw)?;
        validate_commands(&raw)?;
        let profiles = build_profile_table(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.worker, raw.gate, profiles))
    }
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.max_parallel == 0 {
        return Err(WorkgateError::ConfigError(
            "[config].max_parallel must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.config.plan_dir.as_os_str().is_empty() {
        return Err(WorkgateError::ConfigError(
            "[config].plan_dir must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_commands(cfg: &RawConfigFile) -> Result<()> {
    if let Some(worker) = &cfg.worker {
        if worker.cmd.trim().is_empty() {
            return Err(WorkgateError::ConfigError(
                "[worker].cmd must not be empty".to_string(),
            ));
        }
    }

    for (name, gate) in cfg.gate.iter() {
        if gate.cmd.trim().is_empty() {
            return Err(WorkgateError::ConfigError(format!(
                "[gate.{name}].cmd must not be empty"
            )));
        }
    }

    Ok(())
}

/// Merge `[profile.<work-type>]` overrides into the built-in table and make
/// sure the result cannot produce a retry-limit conflict.
fn build_profile_table(cfg: &RawConfigFile) -> Result<ProfileTable> {
    let mut table =
        ProfileTable::builtin().with_default_retry_limit(cfg.config.default_gate_retry_limit);

    for (key, profile) in cfg.profile.iter() {
        let work_type = WorkType::from_str(key)
            .map_err(|e| WorkgateError::ConfigError(format!("[profile.{key}]: {e}")))?;

        if let Some(gate) = profile.gate2.iter().find(|g| profile.gate1.contains(g)) {
            return Err(WorkgateError::ConfigError(format!(
                "[profile.{key}]: gate '{gate}' is listed in both gate1 and gate2"
            )));
        }

        if let Some(gate) = profile
            .retry_limits
            .keys()
            .find(|g| !profile.gates().any(|p| p == g.as_str()))
        {
            return Err(WorkgateError::ConfigError(format!(
                "[profile.{key}]: retry limit for gate '{gate}' which the profile does not run"
            )));
        }

        table.set_profile(work_type, profile.clone());
    }

    table.validate()?;
    Ok(table)
}

/// Check that a validated config can actually drive a run: a worker command
/// and a command for every gate any profile may select.
pub fn validate_runnable(cfg: &ConfigFile) -> Result<()> {
    if cfg.worker.is_none() {
        return Err(WorkgateError::ConfigError(
            "a [worker] section with `cmd` is required to run a plan".to_string(),
        ));
    }

    let missing: Vec<String> = cfg
        .profiles
        .gate_names()
        .into_iter()
        .filter(|gate| !cfg.gate.contains_key(gate))
        .collect();

    if !missing.is_empty() {
        return Err(WorkgateError::ConfigError(format!(
            "no [gate.<name>] command for gates {missing:?}"
        )));
    }

    Ok(())
}
