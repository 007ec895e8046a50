//! Error types for strato-deploy.

/// Result type alias using [`DeployError`].
pub type DeployResult<T> = Result<T, DeployError>;

/// Errors that can occur while packaging, deploying, or invoking.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Source could not be resolved into a self-contained bundle.
    #[error("packaging error: {0}")]
    Packaging(String),

    /// An unrelated bundle already occupies the truncated deployment id.
    #[error("deployment collision: id {id} exists with hash {existing}, local hash is {local}")]
    Collision {
        /// Truncated deployment id both bundles map to.
        id: String,
        /// Full hash recorded on the existing deployment.
        existing: String,
        /// Full hash of the local bundle.
        local: String,
    },

    /// Archive upload failed or was refused.
    #[error("upload error: {0}")]
    Upload(String),

    /// Remote deployment creation failed.
    #[error("deployment creation failed: {0}")]
    Create(String),

    /// Remote-call plumbing failure (network or platform error).
    #[error("transport error: {0}")]
    Transport(String),

    /// The callee failed; only its message is preserved.
    #[error("{0}")]
    Application(String),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Wire protocol error.
    #[error("protocol error: {0}")]
    Proto(#[from] strato_proto::ProtoError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DeployError {
    /// Create a packaging error.
    #[must_use]
    pub fn packaging(msg: impl Into<String>) -> Self {
        Self::Packaging(msg.into())
    }

    /// Create an upload error.
    #[must_use]
    pub fn upload(msg: impl Into<String>) -> Self {
        Self::Upload(msg.into())
    }

    /// Create a transport error.
    #[must_use]
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
