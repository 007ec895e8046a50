//! Error types for the protocol.

use thiserror::Error;

/// Result type alias using [`ProtoError`].
pub type ProtoResult<T> = Result<T, ProtoError>;

/// Protocol errors.
#[derive(Error, Debug)]
pub enum ProtoError {
    /// Serialisation error.
    #[error("serialisation error: {0}")]
    Serialise(#[source] serde_json::Error),

    /// Deserialisation error.
    #[error("deserialisation error: {0}")]
    Deserialise(#[source] serde_json::Error),

    /// A framed message contained an embedded newline.
    #[error("message contains embedded newline")]
    EmbeddedNewline,
}
