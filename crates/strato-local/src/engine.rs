//! The local execution engine.
//!
//! All queueing, slot assignment, retry, and settlement decisions happen on
//! one control-loop task. Call attempts run as futures polled by that same
//! task; in isolated mode the actual work happens in a worker child process,
//! so the loop future merely shuttles protocol frames and the children
//! provide the parallelism. In shared mode the attempt future runs the
//! handler itself, which means synchronous CPU-bound work serialises to a
//! concurrency of one.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use serde_json::Value;
use strato_proto::FunctionCall;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{LocalError, LocalResult};
use crate::process::WorkerProcess;
use crate::registry::FunctionRegistry;
use crate::worker::WorkerSpec;

/// Occupancy of one execution slot.
enum Slot {
    /// No worker; isolated mode spawns one on the next assignment.
    Vacant,
    /// A live worker waiting for its next call.
    Idle(WorkerProcess),
    /// An attempt is running on this slot.
    Busy,
}

/// Where call attempts execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Attempts run inside the host process. No isolation, no per-slot logs.
    #[default]
    Shared,

    /// Each execution slot owns a worker child process and an append-only
    /// log file. Crashes are contained to the affected call and slot.
    Isolated,
}

/// Engine construction options.
#[derive(Debug, Clone)]
pub struct LocalOptions {
    /// Execution mode.
    pub mode: ExecutionMode,
    /// Maximum simultaneously running attempts (and, in isolated mode, the
    /// maximum number of live workers).
    pub concurrency: usize,
    /// Failed attempts are re-run up to this many extra times.
    pub max_retries: u32,
    /// Directory for per-slot worker logs. Defaults to a fresh directory
    /// under the system temp dir.
    pub log_dir: Option<PathBuf>,
    /// How to start isolated workers. Ignored in shared mode.
    pub worker: WorkerSpec,
}

impl Default for LocalOptions {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            concurrency: 10,
            max_retries: 0,
            log_dir: None,
            worker: WorkerSpec::default(),
        }
    }
}

/// Cleanup behaviour.
#[derive(Debug, Clone, Copy)]
pub struct CleanupOptions {
    /// Abort in-flight attempts and kill their workers. When false, in-flight
    /// attempts are drained to completion first.
    pub kill: bool,
    /// Delete the log directory after the workers have stopped.
    pub delete_logs: bool,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self {
            kill: true,
            delete_logs: false,
        }
    }
}

/// Handle to a submitted call.
///
/// Settles exactly once with the call's outcome. If the engine is cleaned up
/// while the call is queued or in flight, the call is abandoned and
/// [`join`](Self::join) never completes; wrap it in a timeout if that
/// matters to the caller.
#[must_use]
#[derive(Debug)]
pub struct CallHandle {
    rx: oneshot::Receiver<Result<Value, LocalError>>,
}

impl CallHandle {
    /// Waits for the call to settle.
    pub async fn join(self) -> Result<Value, LocalError> {
        match self.rx.await {
            Ok(result) => result,
            // Abandoned by cleanup: per the contract this call never settles.
            Err(_) => futures::future::pending().await,
        }
    }
}

struct Pending {
    id: Uuid,
    call: FunctionCall,
    attempt: u32,
    respond: oneshot::Sender<Result<Value, LocalError>>,
}

struct AttemptOutcome {
    slot: usize,
    /// Returned worker, ready for reuse. `None` after a crash (the slot
    /// respawns lazily) and always in shared mode.
    worker: Option<WorkerProcess>,
    pending: Pending,
    result: Result<Value, String>,
}

enum Command {
    Submit(Pending),
    Cleanup {
        options: CleanupOptions,
        ack: oneshot::Sender<LocalResult<()>>,
    },
}

/// Executes [`FunctionCall`]s locally under remote-like scheduling rules.
#[derive(Debug)]
pub struct LocalEngine {
    tx: mpsc::Sender<Command>,
    log_dir: PathBuf,
    workers: Arc<AtomicUsize>,
}

impl LocalEngine {
    /// Starts the engine and its control loop.
    ///
    /// In shared mode calls execute against `registry`; in isolated mode
    /// each worker child builds its own registry and the one given here is
    /// not consulted.
    pub fn start(registry: FunctionRegistry, options: LocalOptions) -> LocalResult<Self> {
        let log_dir = match &options.log_dir {
            Some(dir) => dir.clone(),
            None => std::env::temp_dir().join(format!("strato-{}", Uuid::new_v4())),
        };
        if options.mode == ExecutionMode::Isolated {
            std::fs::create_dir_all(&log_dir)?;
        }

        let workers = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel(256);

        let concurrency = options.concurrency.max(1);
        info!(
            mode = ?options.mode,
            concurrency,
            max_retries = options.max_retries,
            log_dir = %log_dir.display(),
            "local engine started"
        );

        let control = ControlLoop {
            rx,
            registry: Arc::new(registry),
            options,
            concurrency,
            log_dir: log_dir.clone(),
            slots: (0..concurrency).map(|_| Slot::Vacant).collect(),
            queue: VecDeque::new(),
            running: FuturesUnordered::new(),
            workers: Arc::clone(&workers),
        };
        tokio::spawn(control.run());

        Ok(Self {
            tx,
            log_dir,
            workers,
        })
    }

    /// Submits a call for execution.
    ///
    /// Admission is immediate; the returned handle settles once the call
    /// runs. Submitting to a closed engine yields a handle that settles
    /// with [`LocalError::EngineClosed`].
    pub async fn submit(&self, call: FunctionCall) -> CallHandle {
        let (respond, rx) = oneshot::channel();
        let pending = Pending {
            id: Uuid::new_v4(),
            call,
            attempt: 0,
            respond,
        };
        debug!(id = %pending.id, name = %pending.call.name, "call submitted");

        if let Err(mpsc::error::SendError(cmd)) = self.tx.send(Command::Submit(pending)).await {
            if let Command::Submit(refused) = cmd {
                let _ = refused.respond.send(Err(LocalError::EngineClosed));
            }
        }

        CallHandle { rx }
    }

    /// Submits a call by name.
    pub async fn call(&self, name: impl Into<String>, args: Vec<Value>) -> CallHandle {
        self.submit(FunctionCall::new(name, args)).await
    }

    /// Stops the engine.
    ///
    /// Ordering is fixed: admission stops first, then queued calls are
    /// abandoned, then in-flight attempts are aborted (or drained when
    /// `kill` is false), then workers stop, then logs are deleted if
    /// requested. Idempotent: cleaning up a stopped engine is a no-op.
    pub async fn cleanup(&self, options: CleanupOptions) -> LocalResult<()> {
        let (ack, ack_rx) = oneshot::channel();
        if self
            .tx
            .send(Command::Cleanup { options, ack })
            .await
            .is_err()
        {
            return Ok(());
        }
        match ack_rx.await {
            Ok(result) => result,
            Err(_) => Ok(()),
        }
    }

    /// Number of currently live worker processes.
    #[must_use]
    pub fn active_workers(&self) -> usize {
        self.workers.load(Ordering::SeqCst)
    }

    /// Directory holding per-slot worker logs.
    #[must_use]
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Log file path for an execution slot.
    #[must_use]
    pub fn log_path(&self, slot: usize) -> PathBuf {
        self.log_dir.join(format!("{slot}.log"))
    }
}

struct ControlLoop {
    rx: mpsc::Receiver<Command>,
    registry: Arc<FunctionRegistry>,
    options: LocalOptions,
    concurrency: usize,
    log_dir: PathBuf,
    slots: Vec<Slot>,
    queue: VecDeque<Pending>,
    running: FuturesUnordered<BoxFuture<'static, AttemptOutcome>>,
    workers: Arc<AtomicUsize>,
}

impl ControlLoop {
    async fn run(mut self) {
        let finish = loop {
            self.dispatch();

            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    Some(Command::Submit(pending)) => self.queue.push_back(pending),
                    Some(Command::Cleanup { options, ack }) => break Some((options, ack)),
                    // Engine handle dropped without cleanup: tear down hard.
                    None => break None,
                },
                Some(outcome) = self.running.next(), if !self.running.is_empty() => {
                    self.settle(outcome, true);
                }
            }
        };

        let (options, ack) = match finish {
            Some((options, ack)) => (options, Some(ack)),
            None => (CleanupOptions::default(), None),
        };
        let result = self.shutdown(options).await;
        if let Some(ack) = ack {
            let _ = ack.send(result);
        }
    }

    /// Fills free capacity from the queue.
    fn dispatch(&mut self) {
        while self.running.len() < self.concurrency {
            let Some(pending) = self.queue.pop_front() else {
                return;
            };
            let Some(slot) = self.free_slot() else {
                self.queue.push_front(pending);
                return;
            };
            match self.options.mode {
                ExecutionMode::Shared => self.launch_shared(pending, slot),
                ExecutionMode::Isolated => self.launch_isolated(pending, slot),
            }
        }
    }

    /// Picks a free slot, preferring one with a live worker to reuse.
    fn free_slot(&self) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| matches!(s, Slot::Idle(_)))
            .or_else(|| self.slots.iter().position(|s| matches!(s, Slot::Vacant)))
    }

    fn launch_shared(&mut self, pending: Pending, slot: usize) {
        self.slots[slot] = Slot::Busy;
        let registry = Arc::clone(&self.registry);
        debug!(id = %pending.id, slot, attempt = pending.attempt, "attempt started");
        self.running.push(
            async move {
                let result = registry.invoke(&pending.call).await;
                AttemptOutcome {
                    slot,
                    worker: None,
                    pending,
                    result,
                }
            }
            .boxed(),
        );
    }

    fn launch_isolated(&mut self, pending: Pending, slot: usize) {
        let worker = match mem::replace(&mut self.slots[slot], Slot::Busy) {
            Slot::Idle(worker) => worker,
            Slot::Vacant | Slot::Busy => {
                let log_path = self.log_dir.join(format!("{slot}.log"));
                match WorkerProcess::spawn(&self.options.worker, slot, &log_path) {
                    Ok(worker) => {
                        self.workers.fetch_add(1, Ordering::SeqCst);
                        worker
                    }
                    Err(e) => {
                        self.slots[slot] = Slot::Vacant;
                        self.retry_or_fail(pending, e.to_string(), true);
                        return;
                    }
                }
            }
        };

        let workers = Arc::clone(&self.workers);
        debug!(id = %pending.id, slot, attempt = pending.attempt, "attempt started");
        self.running.push(
            async move {
                let mut worker = worker;
                match worker.execute(&pending.call).await {
                    Ok(ret) => AttemptOutcome {
                        slot,
                        worker: Some(worker),
                        pending,
                        result: ret.into_result(),
                    },
                    Err(failure) => {
                        // The worker's state is unknown after either failure
                        // kind, so the slot loses its process and respawns
                        // lazily on the next assignment.
                        worker.kill().await;
                        workers.fetch_sub(1, Ordering::SeqCst);
                        AttemptOutcome {
                            slot,
                            worker: None,
                            pending,
                            result: Err(failure.reason().to_owned()),
                        }
                    }
                }
            }
            .boxed(),
        );
    }

    /// Settles a finished attempt, requeueing on failure while retries
    /// remain and `allow_retry` holds.
    fn settle(&mut self, outcome: AttemptOutcome, allow_retry: bool) {
        self.slots[outcome.slot] = match outcome.worker {
            Some(worker) => Slot::Idle(worker),
            None => Slot::Vacant,
        };

        match outcome.result {
            Ok(value) => {
                debug!(id = %outcome.pending.id, slot = outcome.slot, "call succeeded");
                let _ = outcome.pending.respond.send(Ok(value));
            }
            Err(reason) => self.retry_or_fail(outcome.pending, reason, allow_retry),
        }
    }

    fn retry_or_fail(&mut self, mut pending: Pending, reason: String, allow_retry: bool) {
        if allow_retry && pending.attempt < self.options.max_retries {
            pending.attempt += 1;
            warn!(
                id = %pending.id,
                attempt = pending.attempt,
                reason = %reason,
                "attempt failed, retrying"
            );
            self.queue.push_back(pending);
        } else {
            let attempts = pending.attempt + 1;
            warn!(id = %pending.id, attempts, reason = %reason, "call failed");
            let _ = pending
                .respond
                .send(Err(LocalError::RetryExhausted { attempts, reason }));
        }
    }

    async fn shutdown(mut self, options: CleanupOptions) -> LocalResult<()> {
        info!(kill = options.kill, delete_logs = options.delete_logs, "engine cleanup");
        self.rx.close();

        // Late submissions buffered behind the cleanup command are refused;
        // a concurrent second cleanup is acknowledged as a no-op.
        while let Ok(cmd) = self.rx.try_recv() {
            match cmd {
                Command::Submit(pending) => {
                    let _ = pending.respond.send(Err(LocalError::EngineClosed));
                }
                Command::Cleanup { ack, .. } => {
                    let _ = ack.send(Ok(()));
                }
            }
        }

        // Queued calls are abandoned: their handles never settle.
        self.queue.clear();

        if options.kill {
            // Dropping the attempt futures abandons the in-flight calls and
            // kills their workers via kill_on_drop.
            self.running.clear();
        } else {
            loop {
                let Some(outcome) = self.running.next().await else {
                    break;
                };
                self.settle(outcome, false);
            }
        }

        for slot in mem::take(&mut self.slots) {
            if let Slot::Idle(mut worker) = slot {
                if options.kill {
                    worker.kill().await;
                } else {
                    worker.shutdown().await;
                }
            }
        }
        self.workers.store(0, Ordering::SeqCst);

        if options.delete_logs {
            match tokio::fs::remove_dir_all(&self.log_dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(LocalError::Cleanup(format!(
                        "failed to delete {}: {e}",
                        self.log_dir.display()
                    )));
                }
            }
        }

        info!("engine stopped");
        Ok(())
    }
}
