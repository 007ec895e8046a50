//! Wire protocol types for Strato function invocation.
//!
//! A call crosses every boundary in the same shape: a [`FunctionCall`] goes
//! out, a [`FunctionReturn`] comes back. The remote path additionally wraps
//! the return in a [`TransportEnvelope`] so that platform-level failures are
//! distinguishable from failures of the callee itself.
//!
//! All messages are JSON. The parent ↔ worker channel of the local engine
//! uses the same types, framed one message per line (see [`codec`]).

mod call;
pub mod codec;
mod envelope;
mod error;

pub use call::{FunctionCall, FunctionReturn};
pub use envelope::TransportEnvelope;
pub use error::{ProtoError, ProtoResult};
