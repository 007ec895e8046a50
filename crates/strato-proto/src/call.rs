//! Function call and return message types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request to invoke a named function.
///
/// `name` must identify a function present in whatever bundle or registry
/// ends up executing the call. Unresolved names fail at call time, not at
/// construction time.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FunctionCall {
    /// Target function name.
    pub name: String,

    /// Positional arguments, in declaration order.
    ///
    /// Arguments are assumed JSON-representable; they are not verified
    /// against the callee's signature.
    pub args: Vec<Value>,
}

impl FunctionCall {
    /// Creates a call with the given name and arguments.
    #[must_use]
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// Result of a function invocation.
///
/// Only a JSON value or a message string crosses the boundary. Stack traces
/// and structured error types stay on the side that produced them.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FunctionReturn {
    /// The function completed and produced a value.
    Returned {
        /// JSON-representable return value.
        value: Value,
    },

    /// The function failed.
    Error {
        /// Human-readable failure description.
        message: String,
    },
}

impl FunctionReturn {
    /// Creates a success return.
    #[must_use]
    pub const fn returned(value: Value) -> Self {
        Self::Returned { value }
    }

    /// Creates an error return.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Checks whether this is the error variant.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Converts into a `Result`, discarding the tag.
    pub fn into_result(self) -> Result<Value, String> {
        match self {
            Self::Returned { value } => Ok(value),
            Self::Error { message } => Err(message),
        }
    }
}

impl From<Result<Value, String>> for FunctionReturn {
    fn from(result: Result<Value, String>) -> Self {
        match result {
            Ok(value) => Self::Returned { value },
            Err(message) => Self::Error { message },
        }
    }
}
