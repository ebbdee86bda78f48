// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `workgate`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "workgate",
    version,
    about = "Dependency-aware work-unit orchestration with quality gates.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Workgate.toml` in the current working directory. A missing
    /// default file means built-in defaults.
    #[arg(long, value_name = "PATH", default_value = "Workgate.toml", global = true)]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `WORKGATE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Build a plan from a JSON decomposition and save it.
    Plan {
        /// Decomposition file (`{"kind": "flat", ...}` or `{"kind": "tree", ...}`).
        #[arg(long, value_name = "FILE")]
        input: PathBuf,

        #[arg(long, default_value = "plan")]
        name: String,

        /// Validate and print the plan without saving it.
        #[arg(long)]
        dry_run: bool,
    },

    /// Drive a saved plan to completion, resuming interrupted work.
    Run {
        #[arg(long, default_value = "plan")]
        name: String,
    },

    /// Print the state of a saved plan.
    Status {
        #[arg(long, default_value = "plan")]
        name: String,
    },

    /// Skip a unit that has not been dispatched, and everything depending on it.
    Skip {
        unit: String,

        #[arg(long, default_value = "plan")]
        name: String,
    },

    /// Move a finished plan into the archive.
    Archive {
        #[arg(long, default_value = "plan")]
        name: String,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
