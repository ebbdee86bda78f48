// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod gate;
pub mod logging;
pub mod plan;
pub mod scope;
pub mod tracker;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, Command};
use crate::config::{load_or_default, validate_runnable, ConfigFile};
use crate::dag::{DagGraph, GraphBuilder, UnitSpec};
use crate::engine::{skip_unit, Orchestrator, OrchestratorOptions, UnitEvent};
use crate::exec::{CommandGates, CommandWorker};
use crate::plan::{FilePlanStore, Plan, PlanStore};
use crate::tracker::{Dependency, Issue, IssueTracker, MemoryTracker, TrackerSnapshot};

/// Input accepted by `workgate plan --input`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Decomposition {
    /// A flat list of units.
    Flat { units: Vec<UnitSpec> },
    /// A tracker snapshot; the plan is built from the tree under `root`, or
    /// from every top-level issue when `root` is absent.
    Tree {
        #[serde(default)]
        root: Option<String>,
        issues: Vec<Issue>,
        #[serde(default)]
        dependencies: Vec<Dependency>,
    },
}

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_or_default(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;
    let plan_dir = cfg.config.plan_dir.clone();

    match args.command {
        Command::Plan {
            input,
            name,
            dry_run,
        } => plan_command(&plan_dir, &input, &name, dry_run).await,
        Command::Run { name } => run_command(&cfg, &plan_dir, &name).await,
        Command::Status { name } => {
            let store = FilePlanStore::on_disk(&plan_dir, &name);
            let plan = store.load()?;
            print_status(&plan);
            Ok(())
        }
        Command::Skip { unit, name } => {
            let mut store = FilePlanStore::on_disk(&plan_dir, &name);
            let skipped = skip_unit(&mut store, &unit, "skipped by operator")?;
            println!("skipped: {}", skipped.join(", "));
            Ok(())
        }
        Command::Archive { name } => {
            let mut store = FilePlanStore::on_disk(&plan_dir, &name);
            store.archive()?;
            println!("archived plan '{name}'");
            Ok(())
        }
    }
}

async fn plan_command(plan_dir: &Path, input: &Path, name: &str, dry_run: bool) -> Result<()> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("reading decomposition {}", input.display()))?;
    let decomposition: Decomposition = serde_json::from_str(&text)
        .with_context(|| format!("parsing decomposition {}", input.display()))?;

    let (plan, tracker) = build_plan(name, decomposition).await?;

    if dry_run {
        print_dry_run(&plan)?;
        return Ok(());
    }

    let mut store = FilePlanStore::on_disk(plan_dir, name);
    if store.exists() {
        warn!(plan = %name, "replacing existing plan");
    }
    store.save(&plan)?;

    if let Some(tracker) = tracker {
        save_tracker(&tracker_path(plan_dir, name), &tracker.snapshot())?;
    }

    info!(plan = %name, path = %store.path().display(), "plan saved");
    println!(
        "saved plan '{name}' ({} units, strategy {})",
        plan.len(),
        plan.strategy()
    );
    Ok(())
}

/// Build a plan from a decomposition. Tree inputs also yield the tracker
/// the plan was built from.
pub async fn build_plan(
    name: &str,
    decomposition: Decomposition,
) -> crate::errors::Result<(Plan, Option<MemoryTracker>)> {
    let builder = GraphBuilder::new(name);
    match decomposition {
        Decomposition::Flat { units } => Ok((builder.from_units(units)?, None)),
        Decomposition::Tree {
            root,
            issues,
            dependencies,
        } => {
            let roots: Vec<String> = match root {
                Some(root) => vec![root],
                None => issues
                    .iter()
                    .filter(|i| i.parent.is_none())
                    .map(|i| i.id.clone())
                    .collect(),
            };
            let tracker = MemoryTracker::from_snapshot(TrackerSnapshot {
                issues,
                dependencies,
            })?;

            let plan = match roots.as_slice() {
                [root] => builder.from_tracker(&tracker, root).await?,
                _ => {
                    let mut trees = Vec::with_capacity(roots.len());
                    for root in &roots {
                        trees.push(tracker.query_dependency_tree(root).await?);
                    }
                    builder.from_tree(&trees)?
                }
            };
            Ok((plan, Some(tracker)))
        }
    }
}

async fn run_command(cfg: &ConfigFile, plan_dir: &Path, name: &str) -> Result<()> {
    validate_runnable(cfg)?;

    let worker_cmd = cfg
        .worker
        .as_ref()
        .map(|w| w.cmd.clone())
        .context("missing [worker] section")?;
    let worker = Arc::new(CommandWorker::new(worker_cmd));
    let gates = Arc::new(CommandGates::new(cfg.gate_commands()));

    let store = FilePlanStore::on_disk(plan_dir, name);
    let mut orchestrator = Orchestrator::new(
        store,
        OrchestratorOptions::from_config(cfg),
        worker,
        gates,
        cfg.gate_selector()?,
    );

    let tracker_file = tracker_path(plan_dir, name);
    let tracker = if tracker_file.exists() {
        let tracker = Arc::new(load_tracker(&tracker_file)?);
        orchestrator = orchestrator.with_tracker(tracker.clone());
        Some(tracker)
    } else {
        None
    };

    // Ctrl-C -> graceful shutdown.
    {
        let tx = orchestrator.event_sender();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(UnitEvent::ShutdownRequested).await;
        });
    }

    let report = orchestrator.run().await?;

    if let Some(tracker) = tracker {
        save_tracker(&tracker_file, &tracker.snapshot())?;
    }

    print!("{report}");
    if !report.is_success() {
        anyhow::bail!(
            "plan '{name}' did not complete: {} failed, {} interrupted",
            report.failed.len(),
            report.interrupted.len()
        );
    }
    Ok(())
}

/// Tracker snapshot kept next to a plan built from a tree decomposition.
fn tracker_path(plan_dir: &Path, name: &str) -> PathBuf {
    plan_dir.join(format!("{name}.tracker.json"))
}

fn load_tracker(path: &Path) -> Result<MemoryTracker> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading tracker snapshot {}", path.display()))?;
    let snapshot: TrackerSnapshot = serde_json::from_str(&text)
        .with_context(|| format!("parsing tracker snapshot {}", path.display()))?;
    Ok(MemoryTracker::from_snapshot(snapshot)?)
}

fn save_tracker(path: &Path, snapshot: &TrackerSnapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(snapshot)?;
    std::fs::write(path, text)
        .with_context(|| format!("writing tracker snapshot {}", path.display()))?;
    Ok(())
}

/// Dry-run output: units, groups, dependencies and execution order.
fn print_dry_run(plan: &Plan) -> Result<()> {
    println!("workgate dry-run");
    println!("  plan = {}", plan.name());
    println!("  strategy = {}", plan.strategy());
    println!();

    println!("units ({}):", plan.len());
    for unit in plan.units() {
        println!("  - {} [{}] {}", unit.id, unit.group_number, unit.title);
        if !unit.blocked_by.is_empty() {
            println!("      blocked_by: {:?}", unit.blocked_by);
        }
        if !unit.scope_files.is_empty() {
            println!("      scope: {:?}", unit.scope_files);
        }
        let size = unit.size_metrics;
        println!(
            "      size: {} files, {} LOC, {}h",
            size.files, size.loc, size.hours
        );
    }

    let order = DagGraph::from_plan(plan).topological_order()?;
    println!();
    println!("execution order: {}", order.join(" -> "));

    debug!("dry-run complete (nothing saved)");
    Ok(())
}

fn print_status(plan: &Plan) {
    println!("plan {} ({})", plan.name(), plan.strategy());
    for (status, count) in plan.status_counts() {
        println!("  {status}: {count}");
    }

    for unit in plan.units() {
        println!("  - {} [{}] {}", unit.id, unit.group_number, unit.status);
        if let Some(reason) = &unit.skip_reason {
            println!("      skipped: {reason}");
        }
        if let Some(failure) = &unit.failure {
            let gate = failure.gate.as_deref().unwrap_or("worker");
            println!("      failed at {gate}: {}", failure.reason);
            for (attempt, issues) in failure.history.iter().enumerate() {
                println!("        attempt {}: {}", attempt + 1, issues.join("; "));
            }
        }
    }
}
