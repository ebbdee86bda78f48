use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use workgate::errors::{Result, WorkgateError};
use workgate::exec::{BoxFuture, GateBackend, GateRequest};

/// Passing gate report.
pub fn pass_report(gate: &str) -> Value {
    json!({
        "gateName": gate,
        "allChecksPassed": true,
        "blockingIssues": [],
        "metrics": {},
    })
}

/// Failing gate report with the given blocking issues.
pub fn fail_report(gate: &str, issues: &[&str]) -> Value {
    json!({
        "gateName": gate,
        "allChecksPassed": false,
        "blockingIssues": issues,
        "metrics": { "issues": issues.len() },
    })
}

#[derive(Debug, Clone)]
enum Scripted {
    Answer(Value),
    Error(String),
    /// Output the backend could not parse as a report at all.
    Malformed(String),
}

#[derive(Debug, Default)]
struct State {
    /// Keyed by `(unit, gate)`; an empty unit matches every unit.
    scripts: HashMap<(String, String), VecDeque<Scripted>>,
    invocations: Vec<GateRequest>,
    in_flight: usize,
    peak: usize,
}

/// Fake gate agents: answer from a script (default: pass) and record every
/// invocation.
#[derive(Debug, Clone, Default)]
pub struct FakeGates {
    state: Arc<Mutex<State>>,
    delay: Duration,
}

impl FakeGates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    /// Queue an answer for the next run of `gate` on any unit.
    pub fn script(&self, gate: &str, answer: Value) -> &Self {
        self.push("", gate, Scripted::Answer(answer));
        self
    }

    /// Queue an answer for the next run of `gate` on `unit`.
    pub fn script_for(&self, unit: &str, gate: &str, answer: Value) -> &Self {
        self.push(unit, gate, Scripted::Answer(answer));
        self
    }

    /// Queue a backend error for the next run of `gate`.
    pub fn script_error(&self, gate: &str, message: &str) -> &Self {
        self.push("", gate, Scripted::Error(message.to_string()));
        self
    }

    /// Queue unparsable output for the next run of `gate`, surfaced by the
    /// backend as a validation error.
    pub fn script_malformed(&self, gate: &str, output: &str) -> &Self {
        self.push("", gate, Scripted::Malformed(output.to_string()));
        self
    }

    fn push(&self, unit: &str, gate: &str, item: Scripted) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .entry((unit.to_string(), gate.to_string()))
            .or_default()
            .push_back(item);
    }

    pub fn invocations(&self) -> Vec<GateRequest> {
        self.state.lock().unwrap().invocations.clone()
    }

    /// Gate names in invocation order.
    pub fn invoked_gates(&self) -> Vec<String> {
        self.invocations()
            .into_iter()
            .map(|r| r.gate_name)
            .collect()
    }

    pub fn invocation_count(&self, gate: &str) -> usize {
        self.invocations()
            .iter()
            .filter(|r| r.gate_name == gate)
            .count()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.state.lock().unwrap().peak
    }
}

impl GateBackend for FakeGates {
    fn run_gate(&self, request: GateRequest) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let gate = request.gate_name.clone();
            let scripted = {
                let mut state = self.state.lock().unwrap();
                state.invocations.push(request.clone());
                state.in_flight += 1;
                state.peak = state.peak.max(state.in_flight);

                let unit_key = (request.unit_id.clone(), gate.clone());
                let any_key = (String::new(), gate.clone());
                match state.scripts.get_mut(&unit_key).and_then(VecDeque::pop_front) {
                    Some(item) => Some(item),
                    None => state.scripts.get_mut(&any_key).and_then(VecDeque::pop_front),
                }
            };

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            self.state.lock().unwrap().in_flight -= 1;

            match scripted {
                Some(Scripted::Answer(value)) => Ok(value),
                Some(Scripted::Error(message)) => {
                    Err(WorkgateError::Other(anyhow::anyhow!(message)))
                }
                Some(Scripted::Malformed(output)) => Err(WorkgateError::ValidationError(
                    format!("gate '{gate}' printed no JSON report: {output}"),
                )),
                None => Ok(pass_report(&gate)),
            }
        })
    }
}
