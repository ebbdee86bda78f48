// src/logging.rs

//! Logging setup for `workgate` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `WORKGATE_LOG` environment variable, either a plain level ("debug") or
//!    full filter directives ("workgate::engine=debug,info")
//! 3. default to `info`
//!
//! Logs are sent to STDERR so that stdout carries only plan/status output.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::cli::LogLevel;

/// Environment variable consulted when no `--log-level` is given.
pub const LOG_ENV: &str = "WORKGATE_LOG";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = resolve_filter(cli_level, std::env::var(LOG_ENV).ok().as_deref());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("installing tracing subscriber")?;

    Ok(())
}

/// Pick the filter from the CLI flag, then the env value, then `info`.
/// An env value that does not parse falls back to `info`.
pub fn resolve_filter(cli_level: Option<LogLevel>, env_value: Option<&str>) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(level_directive(level));
    }

    env_value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| EnvFilter::try_new(normalize_level(s)).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn level_directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

/// Accept "warning" and upper-case level names as plain levels.
fn normalize_level(s: &str) -> String {
    match s.to_lowercase().as_str() {
        "warning" => "warn".to_string(),
        lower @ ("error" | "warn" | "info" | "debug" | "trace") => lower.to_string(),
        _ => s.to_string(),
    }
}
