//! Transport envelope for remote invocation responses.

use serde::{Deserialize, Serialize};

/// Platform-level wrapper around a serialised [`FunctionReturn`].
///
/// The two fields represent independent failure layers. A present `error`
/// means the call never reached the callee (or its result never made it
/// back) and preempts any attempt to parse `result`.
///
/// [`FunctionReturn`]: crate::FunctionReturn
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportEnvelope {
    /// Transport-level error message, if the platform failed the call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Serialised `FunctionReturn`, if the transport succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl TransportEnvelope {
    /// Creates an envelope carrying a successful transport result.
    #[must_use]
    pub fn ok(result: impl Into<String>) -> Self {
        Self {
            error: None,
            result: Some(result.into()),
        }
    }

    /// Creates an envelope signalling a transport failure.
    #[must_use]
    pub fn transport_error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            result: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_field_omitted_on_success() {
        let wire = serde_json::to_string(&TransportEnvelope::ok("{}")).unwrap();
        assert_eq!(wire, r#"{"result":"{}"}"#);
    }

    #[test]
    fn transport_error_roundtrip() {
        let envelope = TransportEnvelope::transport_error("connection reset");
        let wire = serde_json::to_string(&envelope).unwrap();
        let parsed: TransportEnvelope = serde_json::from_str(&wire).unwrap();
        assert_eq!(parsed.error.as_deref(), Some("connection reset"));
        assert!(parsed.result.is_none());
    }
}
