use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use workgate::errors::{Result, WorkgateError};
use workgate::exec::{BoxFuture, DispatchRequest, WorkerBackend};

/// Successful worker answer.
pub fn worker_result(files: &[&str]) -> Value {
    json!({
        "filesModified": files,
        "validationPassed": true,
        "narrativeSummary": "done",
    })
}

/// Worker answer reporting that its own validation failed.
pub fn failed_result(summary: &str) -> Value {
    json!({
        "filesModified": [],
        "validationPassed": false,
        "narrativeSummary": summary,
    })
}

#[derive(Debug, Clone)]
enum Scripted {
    Answer(Value),
    Error(String),
}

#[derive(Debug, Default)]
struct State {
    scripts: HashMap<String, VecDeque<Scripted>>,
    dispatches: Vec<DispatchRequest>,
    in_flight: Vec<String>,
    /// For each dispatch: the units already in flight when it started.
    overlaps: Vec<(String, Vec<String>)>,
    finished: Vec<String>,
    peak: usize,
}

/// A fake worker that:
/// - answers from a per-unit script, falling back to "modified exactly the
///   declared scope, validation passed"
/// - records every dispatch request and which units overlapped in time
#[derive(Debug, Clone, Default)]
pub struct FakeWorker {
    state: Arc<Mutex<State>>,
    delay: Duration,
}

impl FakeWorker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep every dispatch in flight for `ms` milliseconds.
    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    /// Queue a raw JSON answer for the next dispatch of `unit`.
    pub fn script(&self, unit: &str, answer: Value) -> &Self {
        self.push(unit, Scripted::Answer(answer));
        self
    }

    /// Queue a backend error for the next dispatch of `unit`.
    pub fn script_error(&self, unit: &str, message: &str) -> &Self {
        self.push(unit, Scripted::Error(message.to_string()));
        self
    }

    fn push(&self, unit: &str, item: Scripted) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .entry(unit.to_string())
            .or_default()
            .push_back(item);
    }

    pub fn dispatches(&self) -> Vec<DispatchRequest> {
        self.state.lock().unwrap().dispatches.clone()
    }

    pub fn dispatches_for(&self, unit: &str) -> Vec<DispatchRequest> {
        self.dispatches()
            .into_iter()
            .filter(|d| d.unit_id == unit)
            .collect()
    }

    /// Unit ids in dispatch order (one entry per dispatch).
    pub fn dispatch_order(&self) -> Vec<String> {
        self.dispatches().into_iter().map(|d| d.unit_id).collect()
    }

    /// Units whose dispatch had already returned, in return order.
    pub fn finished(&self) -> Vec<String> {
        self.state.lock().unwrap().finished.clone()
    }

    /// For each dispatch, the units that were in flight when it started.
    pub fn overlaps(&self) -> Vec<(String, Vec<String>)> {
        self.state.lock().unwrap().overlaps.clone()
    }

    /// Highest number of dispatches in flight at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.state.lock().unwrap().peak
    }
}

impl WorkerBackend for FakeWorker {
    fn dispatch(&self, request: DispatchRequest) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let unit = request.unit_id.clone();
            let scripted = {
                let mut state = self.state.lock().unwrap();
                let others = state.in_flight.clone();
                state.overlaps.push((unit.clone(), others));
                state.in_flight.push(unit.clone());
                state.peak = state.peak.max(state.in_flight.len());
                state.dispatches.push(request.clone());
                state.scripts.get_mut(&unit).and_then(VecDeque::pop_front)
            };

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            {
                let mut state = self.state.lock().unwrap();
                if let Some(pos) = state.in_flight.iter().position(|u| u == &unit) {
                    state.in_flight.remove(pos);
                }
                state.finished.push(unit.clone());
            }

            match scripted {
                Some(Scripted::Answer(value)) => Ok(value),
                Some(Scripted::Error(message)) => {
                    Err(WorkgateError::Other(anyhow::anyhow!(message)))
                }
                None => {
                    let files: Vec<&str> =
                        request.scope_files.iter().map(String::as_str).collect();
                    Ok(worker_result(&files))
                }
            }
        })
    }
}
