//! Error types for strato-sdk.

/// Result type alias using [`SdkError`].
pub type SdkResult<T> = Result<T, SdkError>;

/// Errors surfaced by the client.
#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    /// Remote packaging, deployment, or invocation failure.
    #[error(transparent)]
    Deploy(#[from] strato_deploy::DeployError),

    /// Local execution failure.
    #[error(transparent)]
    Local(#[from] strato_local::LocalError),

    /// Backend initialisation failed.
    ///
    /// Initialisation runs once; its failure is cached and replayed to every
    /// caller, so this variant carries the rendered message of the original
    /// error.
    #[error("initialisation failed: {0}")]
    Init(String),

    /// Arguments could not be serialised for the wire.
    #[error("argument serialisation failed: {0}")]
    Encode(String),

    /// The returned value did not decode into the requested type.
    #[error("return value decoding failed: {0}")]
    Decode(String),
}
