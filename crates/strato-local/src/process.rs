//! Parent-side handle for an isolated worker process.
//!
//! A worker owns its child process and pipe ends. Protocol frames travel on
//! stdin/stdout; everything the child writes to stderr is appended to the
//! slot's log file. Dropping the handle closes the pipes and the log file
//! descriptor, and `kill_on_drop` reaps the child.

use std::path::Path;
use std::process::Stdio;

use strato_proto::{codec, FunctionCall, FunctionReturn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

use crate::error::{LocalError, LocalResult};
use crate::worker::WorkerSpec;

/// Why an attempt on a worker failed.
#[derive(Debug)]
pub(crate) enum WorkerFailure {
    /// The process exited or closed its pipes mid-call.
    Crashed(String),

    /// The response could not be decoded.
    Protocol(String),
}

impl WorkerFailure {
    pub(crate) fn reason(&self) -> &str {
        match self {
            Self::Crashed(reason) | Self::Protocol(reason) => reason,
        }
    }
}

/// A running isolated worker bound to one execution slot.
pub(crate) struct WorkerProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    slot: usize,
}

impl WorkerProcess {
    /// Spawns a worker for `slot`, appending its output to `log_path`.
    ///
    /// The log file is opened in append mode so a respawn after a crash
    /// continues the slot's diagnostic history rather than truncating it.
    pub(crate) fn spawn(spec: &WorkerSpec, slot: usize, log_path: &Path) -> LocalResult<Self> {
        let log = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        let program = spec.resolve_program()?;

        let mut child = Command::new(&program)
            .args(&spec.args)
            .envs(spec.env.iter().cloned())
            .env(crate::worker::WORKER_SLOT_ENV, slot.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::from(log))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LocalError::Spawn(format!("{}: {e}", program.display())))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LocalError::Spawn("worker stdin not captured".to_owned()))?;
        let stdout = child
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| LocalError::Spawn("worker stdout not captured".to_owned()))?;

        debug!(slot, program = %program.display(), "worker spawned");

        Ok(Self {
            child,
            stdin,
            stdout,
            slot,
        })
    }

    /// Executes one call, awaiting the worker's response line.
    pub(crate) async fn execute(
        &mut self,
        call: &FunctionCall,
    ) -> Result<FunctionReturn, WorkerFailure> {
        let line = codec::encode_line(call)
            .map_err(|e| WorkerFailure::Protocol(e.to_string()))?;

        if let Err(e) = self.stdin.write_all(line.as_bytes()).await {
            return Err(WorkerFailure::Crashed(format!(
                "worker exited unexpectedly: {e}"
            )));
        }
        if let Err(e) = self.stdin.flush().await {
            return Err(WorkerFailure::Crashed(format!(
                "worker exited unexpectedly: {e}"
            )));
        }

        let mut response = String::new();
        match self.stdout.read_line(&mut response).await {
            Ok(0) => Err(WorkerFailure::Crashed(
                "worker exited unexpectedly".to_owned(),
            )),
            Ok(_) => codec::decode_line(&response)
                .map_err(|e| WorkerFailure::Protocol(format!("bad worker response: {e}"))),
            Err(e) => Err(WorkerFailure::Crashed(format!(
                "worker exited unexpectedly: {e}"
            ))),
        }
    }

    /// Terminates the worker and reaps the process.
    pub(crate) async fn kill(&mut self) {
        let _ = self.child.start_kill();
        let _ = self.child.wait().await;
        debug!(slot = self.slot, "worker terminated");
    }

    /// Waits for the worker to exit on its own after stdin closes.
    pub(crate) async fn shutdown(mut self) {
        // Dropping stdin closes the pipe; the worker loop exits on EOF.
        drop(self.stdin);
        let _ = self.child.wait().await;
        debug!(slot = self.slot, "worker shut down");
    }
}
