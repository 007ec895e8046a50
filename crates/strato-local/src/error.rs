//! Error types for strato-local.

/// Result type alias using [`LocalError`].
pub type LocalResult<T> = Result<T, LocalError>;

/// Errors that can occur in the local engine.
#[derive(Debug, thiserror::Error)]
pub enum LocalError {
    /// The call failed its final attempt; no retries remain.
    #[error("call failed after {attempts} attempt(s): {reason}")]
    RetryExhausted {
        /// Number of executions performed, `max_retries + 1` at most.
        attempts: u32,
        /// Failure reason of the final attempt.
        reason: String,
    },

    /// The engine has stopped admitting calls.
    #[error("engine is closed")]
    EngineClosed,

    /// A worker process could not be spawned.
    #[error("failed to spawn worker: {0}")]
    Spawn(String),

    /// Best-effort cleanup failure; never masks an original failure.
    #[error("cleanup error: {0}")]
    Cleanup(String),

    /// Wire protocol error on the parent ↔ worker channel.
    #[error("protocol error: {0}")]
    Proto(#[from] strato_proto::ProtoError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
