// src/exec/command.rs

use std::collections::BTreeMap;
use std::process::Stdio;

use anyhow::{anyhow, Context};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::{Result, WorkgateError};
use crate::exec::backend::{GateBackend, WorkerBackend};
use crate::exec::contract::{DispatchRequest, GateRequest};
use crate::exec::BoxFuture;

/// Worker backed by a shell command.
///
/// The command receives the `DispatchRequest` as JSON on stdin and must
/// print its `WorkerResult` as JSON on stdout.
#[derive(Debug, Clone)]
pub struct CommandWorker {
    cmd: String,
}

impl CommandWorker {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }
}

impl WorkerBackend for CommandWorker {
    fn dispatch(&self, request: DispatchRequest) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let label = format!("worker for unit '{}'", request.unit_id);
            run_json_command(&label, &self.cmd, &request).await
        })
    }
}

/// Gate agents backed by one shell command per gate name.
#[derive(Debug, Clone, Default)]
pub struct CommandGates {
    commands: BTreeMap<String, String>,
}

impl CommandGates {
    pub fn new(commands: BTreeMap<String, String>) -> Self {
        Self { commands }
    }

    pub fn command_for(&self, gate: &str) -> Option<&str> {
        self.commands.get(gate).map(String::as_str)
    }
}

impl GateBackend for CommandGates {
    fn run_gate(&self, request: GateRequest) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let cmd = self.command_for(&request.gate_name).ok_or_else(|| {
                WorkgateError::ConfigError(format!(
                    "no command configured for gate '{}'",
                    request.gate_name
                ))
            })?;
            let label = format!("gate '{}' for unit '{}'", request.gate_name, request.unit_id);
            run_json_command(&label, cmd, &request).await
        })
    }
}

/// Spawn `cmd`, feed it `input` as JSON and parse what it prints.
///
/// Spawn failures and non-zero exits are backend errors. Output that is not
/// JSON is a `ValidationError`, the same as a response missing fields.
async fn run_json_command<T: Serialize>(
    label: &str,
    cmd: &str,
    input: &T,
) -> Result<serde_json::Value> {
    info!(%label, %cmd, "starting process");

    let payload = serde_json::to_vec(input)?;

    // Build a shell command appropriate for the platform.
    let mut command = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    };

    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .with_context(|| format!("spawning process for {label}"))?;

    // Always consume stderr so buffers don't fill; log at debug.
    if let Some(stderr) = child.stderr.take() {
        let label = label.to_string();
        tokio::spawn(async move {
            let reader = BufReader::new(stderr);
            let mut lines = reader.lines();

            while let Ok(Some(line)) = lines.next_line().await {
                debug!(%label, "stderr: {}", line);
            }
        });
    }

    // Feed stdin while draining stdout: a process may print before it has
    // read its whole request.
    let stdin = child.stdin.take();
    let write_request = async {
        if let Some(mut stdin) = stdin {
            match stdin.write_all(&payload).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!(%label, "process closed stdin before reading the whole request");
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("writing request to {label}"));
                }
            }
            // Dropping stdin closes the pipe so the process sees EOF.
        }
        Ok::<(), anyhow::Error>(())
    };

    let stdout_pipe = child.stdout.take();
    let read_response = async {
        let mut stdout = String::new();
        if let Some(mut out) = stdout_pipe {
            out.read_to_string(&mut stdout)
                .await
                .with_context(|| format!("reading stdout of {label}"))?;
        }
        Ok::<String, anyhow::Error>(stdout)
    };

    let (written, stdout) = tokio::join!(write_request, read_response);
    written?;
    let stdout = stdout?;

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for process of {label}"))?;

    let code = status.code().unwrap_or(-1);
    info!(%label, exit_code = code, success = status.success(), "process exited");

    if !status.success() {
        return Err(anyhow!("{label} exited with code {code}").into());
    }

    parse_response(label, &stdout)
}

/// Accept either a whole-stdout JSON document or a JSON object on the last
/// non-empty line (tools often log before answering).
fn parse_response(label: &str, stdout: &str) -> Result<serde_json::Value> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(stdout.trim()) {
        return Ok(value);
    }

    let last_line = stdout.lines().rev().find(|l| !l.trim().is_empty());
    match last_line.map(|l| serde_json::from_str::<serde_json::Value>(l.trim())) {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => {
            warn!(%label, error = %e, "process output is not JSON");
            Err(WorkgateError::ValidationError(format!(
                "{label} printed invalid JSON: {e}"
            )))
        }
        None => Err(WorkgateError::ValidationError(format!(
            "{label} printed nothing"
        ))),
    }
}
