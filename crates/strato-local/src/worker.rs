//! Isolated worker entry point and spawn specification.
//!
//! Isolated mode runs each execution slot in its own child process. The
//! child speaks line-delimited JSON on stdin/stdout and is expected to call
//! [`run`] with its function registry; diagnostics go to stderr, which the
//! parent redirects into the slot's log file.
//!
//! The usual arrangement is re-execution: the host binary detects
//! [`WORKER_SLOT_ENV`] at startup (via [`slot_from_env`]) and enters the
//! worker loop instead of its normal main.

use std::env;
use std::path::PathBuf;

use strato_proto::{codec, FunctionCall, FunctionReturn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

use crate::error::{LocalError, LocalResult};
use crate::registry::FunctionRegistry;

/// Environment variable carrying the execution slot index to a worker child.
///
/// Its presence marks the process as a worker; the value is the slot index.
pub const WORKER_SLOT_ENV: &str = "STRATO_WORKER_SLOT";

/// How to start an isolated worker process.
#[derive(Debug, Clone, Default)]
pub struct WorkerSpec {
    /// Program to execute; `None` re-executes the current binary.
    pub program: Option<PathBuf>,
    /// Extra arguments passed to the program.
    pub args: Vec<String>,
    /// Extra environment variables set for the worker.
    pub env: Vec<(String, String)>,
}

impl WorkerSpec {
    /// Spec that re-executes the current binary with no extra arguments.
    #[must_use]
    pub fn current_exe() -> Self {
        Self::default()
    }

    /// Spec running an explicit program.
    pub fn program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: Some(program.into()),
            ..Self::default()
        }
    }

    /// Adds an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub(crate) fn resolve_program(&self) -> LocalResult<PathBuf> {
        match &self.program {
            Some(program) => Ok(program.clone()),
            None => env::current_exe()
                .map_err(|e| LocalError::Spawn(format!("cannot resolve current executable: {e}"))),
        }
    }
}

/// Returns the slot index if this process was started as a worker.
#[must_use]
pub fn slot_from_env() -> Option<usize> {
    env::var(WORKER_SLOT_ENV).ok()?.parse().ok()
}

/// Worker loop: serve calls from stdin until the parent closes the pipe.
///
/// Each request line is a [`FunctionCall`]; each response line is a
/// [`FunctionReturn`]. Undecodable requests produce an error return rather
/// than terminating the worker. Never returns until stdin reaches EOF.
pub async fn run(registry: FunctionRegistry) -> LocalResult<()> {
    let slot = slot_from_env();
    debug!(?slot, functions = registry.len(), "worker loop started");

    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut line = String::new();

    loop {
        line.clear();
        if stdin.read_line(&mut line).await? == 0 {
            debug!(?slot, "worker loop finished");
            return Ok(());
        }

        let response = match codec::decode_line::<FunctionCall>(&line) {
            Ok(call) => FunctionReturn::from(registry.invoke(&call).await),
            Err(e) => FunctionReturn::error(format!("bad request: {e}")),
        };

        let encoded = codec::encode_line(&response)?;
        stdout.write_all(encoded.as_bytes()).await?;
        stdout.flush().await?;
    }
}
