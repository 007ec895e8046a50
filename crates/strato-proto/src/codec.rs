//! Line-delimited JSON framing for the parent ↔ worker channel.
//!
//! One message per line. JSON string escaping guarantees the payload itself
//! never contains a raw newline, so a plain line reader is a complete framer.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ProtoError, ProtoResult};

/// Encodes a message as a single newline-terminated JSON line.
pub fn encode_line<T: Serialize>(message: &T) -> ProtoResult<String> {
    let mut line = serde_json::to_string(message).map_err(ProtoError::Serialise)?;
    if line.contains('\n') {
        return Err(ProtoError::EmbeddedNewline);
    }
    line.push('\n');
    Ok(line)
}

/// Decodes a message from one line of input.
pub fn decode_line<T: DeserializeOwned>(line: &str) -> ProtoResult<T> {
    serde_json::from_str(line.trim_end()).map_err(ProtoError::Deserialise)
}
