//! Unified client for Strato.
//!
//! Build a [`CloudClient`] against a local engine or a remote platform, then
//! call functions through typed [`CloudFunction`] proxies; the code making
//! the call is identical either way. Backend initialisation (packaging and
//! deployment for remote, engine start for local) is lazy and coalesced:
//! the first call triggers it, concurrent callers share it, and its outcome
//! is cached for the client's lifetime.
//!
//! ```no_run
//! use strato_local::{FunctionRegistry, LocalOptions};
//! use strato_sdk::CloudClient;
//!
//! # async fn demo() -> Result<(), strato_sdk::SdkError> {
//! let mut registry = FunctionRegistry::new();
//! registry.register_fn("add", |(a, b): (i64, i64)| Ok(a + b));
//!
//! let client = CloudClient::local(registry, LocalOptions::default());
//! let add = client.function::<(i64, i64), i64>("add");
//! assert_eq!(add.call((2, 3)).await?, 5);
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod function;

pub use client::{ClientCleanup, CloudClient};
pub use error::{SdkError, SdkResult};
pub use function::CloudFunction;
