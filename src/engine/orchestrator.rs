// src/engine/orchestrator.rs

use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::ConfigFile;
use crate::dag::Scheduler;
use crate::errors::{Result, WorkgateError};
use crate::exec::backend::{GateBackend, WorkerBackend};
use crate::gate::profile::GateSelector;
use crate::gate::runner::GateRunner;
use crate::plan::{Plan, PlanStore, UnitNote};
use crate::tracker::IssueTracker;
use crate::types::{UnitId, UnitStatus};

use super::lifecycle::{Lifecycle, LifecycleSettings, UnitTask};
use super::{RunReport, UnitEvent, UnitOutcome};

/// Run-wide settings, passed in explicitly at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorOptions {
    /// Cap on concurrently dispatched units (isolated worktrees only).
    pub max_parallel: usize,
    pub worker_retry_limit: u32,
    pub restriction: String,
    pub quality_targets: Vec<String>,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            worker_retry_limit: 2,
            restriction: "only modify files inside scopeFiles".to_string(),
            quality_targets: Vec::new(),
        }
    }
}

impl OrchestratorOptions {
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self {
            max_parallel: cfg.config.max_parallel,
            worker_retry_limit: cfg.config.worker_retry_limit,
            restriction: cfg
                .worker
                .as_ref()
                .map(|w| w.restriction.clone())
                .unwrap_or_else(|| OrchestratorOptions::default().restriction),
            quality_targets: cfg.config.quality_targets.clone(),
        }
    }
}

/// The control loop: drives a persisted plan until every unit is terminal.
///
/// The orchestrator is the only writer of the plan store. It keeps an
/// in-memory copy of the plan in step with every committed write, so
/// scheduling decisions never need to re-read the store.
pub struct Orchestrator<S: PlanStore> {
    store: S,
    options: OrchestratorOptions,
    lifecycle: Arc<Lifecycle>,
    tracker: Option<Arc<dyn IssueTracker>>,
    event_tx: mpsc::Sender<UnitEvent>,
    event_rx: mpsc::Receiver<UnitEvent>,
}

impl<S: PlanStore> fmt::Debug for Orchestrator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("plan", &self.store.plan_ref())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<S: PlanStore> Orchestrator<S> {
    pub fn new(
        store: S,
        options: OrchestratorOptions,
        worker: Arc<dyn WorkerBackend>,
        gates: Arc<dyn GateBackend>,
        selector: GateSelector,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel::<UnitEvent>(64);
        let runner = GateRunner::new(gates, selector.table().default_retry_limit());
        let settings = LifecycleSettings {
            restriction: options.restriction.clone(),
            quality_targets: options.quality_targets.clone(),
            worker_retry_limit: options.worker_retry_limit,
        };
        let lifecycle = Lifecycle::new(worker, runner, Arc::new(selector), settings);

        Self {
            store,
            options,
            lifecycle: Arc::new(lifecycle),
            tracker: None,
            event_tx,
            event_rx,
        }
    }

    /// Close tracker issues as their units complete.
    pub fn with_tracker(mut self, tracker: Arc<dyn IssueTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Sender for injecting events, e.g. `ShutdownRequested` from Ctrl-C.
    pub fn event_sender(&self) -> mpsc::Sender<UnitEvent> {
        self.event_tx.clone()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Load the plan, requeue anything interrupted by a previous run, and
    /// drive it until every unit is terminal or a shutdown is requested.
    ///
    /// Store integrity errors abort the run immediately.
    pub async fn run(&mut self) -> Result<RunReport> {
        let mut plan = self.store.load()?;
        let requeued = plan.requeue_interrupted();
        if !requeued.is_empty() {
            self.store.save(&plan)?;
        }

        let scheduler = Scheduler::for_plan(&plan, self.options.max_parallel);
        info!(
            plan = %plan.name(),
            strategy = %plan.strategy(),
            units = plan.len(),
            remaining = plan.non_terminal_ids().len(),
            "orchestrator started"
        );

        let mut tasks: JoinSet<Result<()>> = JoinSet::new();
        let mut in_flight: Vec<UnitId> = Vec::new();

        loop {
            self.settle(&scheduler, &mut plan)?;

            for id in scheduler.select_dispatch(&plan, &in_flight) {
                self.dispatch(&mut plan, &id, &mut tasks)?;
                in_flight.push(id);
            }

            if in_flight.is_empty() {
                if plan.is_finished() {
                    break;
                }
                return Err(WorkgateError::Other(anyhow!(
                    "plan '{}' stalled with non-terminal units {:?}",
                    plan.name(),
                    plan.non_terminal_ids()
                )));
            }

            tokio::select! {
                Some(event) = self.event_rx.recv() => {
                    debug!(?event, "orchestrator received event");
                    let keep_running = match self.handle_event(&mut plan, &mut in_flight, event).await {
                        Ok(keep_running) => keep_running,
                        Err(e) => {
                            tasks.shutdown().await;
                            return Err(e);
                        }
                    };
                    if !keep_running {
                        tasks.shutdown().await;
                        warn!(interrupted = ?in_flight, "run stopped before the plan finished");
                        return Ok(RunReport::from_plan(&plan, requeued, in_flight));
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    match joined {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            error!(error = %e, "unit task aborted");
                            tasks.shutdown().await;
                            return Err(e);
                        }
                        Err(e) if e.is_cancelled() => {}
                        Err(e) => {
                            tasks.shutdown().await;
                            return Err(WorkgateError::Other(anyhow!("unit task panicked: {e}")));
                        }
                    }
                }
            }
        }

        let report = RunReport::from_plan(&plan, requeued, Vec::new());
        info!(
            plan = %report.plan,
            completed = report.completed.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "plan finished"
        );
        Ok(report)
    }

    /// Commit scheduler promotions and retirements until nothing changes.
    fn settle(&mut self, scheduler: &Scheduler, plan: &mut Plan) -> Result<()> {
        loop {
            let step = scheduler.step(plan);
            if step.is_empty() {
                return Ok(());
            }

            for (unit, upstream) in step.retired {
                let upstream_status = plan
                    .status_of(&upstream)
                    .map(|s| s.to_string())
                    .unwrap_or_default();
                let reason = format!("upstream unit '{upstream}' ended {upstream_status}");
                warn!(unit = %unit, %upstream, "skipping unit; upstream did not complete");
                self.commit(
                    plan,
                    &unit,
                    UnitStatus::Pending,
                    UnitStatus::Skipped,
                    &[UnitNote::SkipReason(reason)],
                )?;
            }

            for unit in step.promoted {
                self.commit(plan, &unit, UnitStatus::Pending, UnitStatus::Ready, &[])?;
            }
        }
    }

    fn dispatch(
        &mut self,
        plan: &mut Plan,
        id: &str,
        tasks: &mut JoinSet<Result<()>>,
    ) -> Result<()> {
        self.commit(plan, id, UnitStatus::Ready, UnitStatus::Dispatched, &[])?;

        let unit = plan
            .unit(id)
            .ok_or_else(|| WorkgateError::UnitNotFound(id.to_string()))?;
        info!(unit = %id, group = %unit.group_number, "unit dispatched");

        let task = UnitTask::from_unit(unit);
        let lifecycle = Arc::clone(&self.lifecycle);
        let events = self.event_tx.clone();
        tasks.spawn(async move { lifecycle.drive(task, events).await });
        Ok(())
    }

    /// Apply one event. Returns `false` when the run must stop.
    async fn handle_event(
        &mut self,
        plan: &mut Plan,
        in_flight: &mut Vec<UnitId>,
        event: UnitEvent,
    ) -> Result<bool> {
        match event {
            UnitEvent::WorkerReturned {
                unit,
                files_modified,
            } => {
                let notes: Vec<UnitNote> = files_modified
                    .map(UnitNote::FilesModified)
                    .into_iter()
                    .collect();
                if plan.status_of(&unit) == Some(UnitStatus::Dispatched) {
                    self.commit(
                        plan,
                        &unit,
                        UnitStatus::Dispatched,
                        UnitStatus::GateRunning,
                        &notes,
                    )?;
                } else if !notes.is_empty() {
                    self.annotate(plan, &unit, &notes)?;
                }
            }
            UnitEvent::GateResults { unit, results } => {
                self.annotate(plan, &unit, &[UnitNote::GateResults(results)])?;
            }
            UnitEvent::Finished { unit, outcome } => {
                in_flight.retain(|id| id != &unit);
                match outcome {
                    UnitOutcome::Completed => {
                        self.commit(
                            plan,
                            &unit,
                            UnitStatus::GateRunning,
                            UnitStatus::Completed,
                            &[],
                        )?;
                        info!(unit = %unit, "unit completed");
                        self.close_issue(&unit).await;
                    }
                    UnitOutcome::Failed(record) => {
                        error!(
                            unit = %unit,
                            kind = ?record.kind,
                            gate = ?record.gate,
                            reason = %record.reason,
                            attempts = record.history.len(),
                            "unit failed; escalating to operator"
                        );
                        self.commit(
                            plan,
                            &unit,
                            UnitStatus::GateRunning,
                            UnitStatus::Failed,
                            &[UnitNote::Failure(record)],
                        )?;
                    }
                }
            }
            UnitEvent::ShutdownRequested => {
                info!("shutdown requested; no further units will be dispatched");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Persist a transition, then mirror it into the in-memory plan.
    fn commit(
        &mut self,
        plan: &mut Plan,
        unit: &str,
        from: UnitStatus,
        to: UnitStatus,
        notes: &[UnitNote],
    ) -> Result<()> {
        self.store.record_transition_with(unit, from, to, notes)?;
        plan.apply_transition(unit, from, to)?;
        plan.apply_notes(unit, notes)
    }

    fn annotate(&mut self, plan: &mut Plan, unit: &str, notes: &[UnitNote]) -> Result<()> {
        self.store.annotate(unit, notes)?;
        plan.apply_notes(unit, notes)
    }

    async fn close_issue(&self, unit: &str) {
        let Some(tracker) = &self.tracker else {
            return;
        };
        match tracker.close_issue(unit).await {
            Ok(()) => debug!(unit, "closed tracker issue"),
            Err(e) => warn!(unit, error = %e, "failed to close tracker issue"),
        }
    }
}
