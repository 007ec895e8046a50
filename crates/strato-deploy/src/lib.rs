//! Packaging, deployment, and remote invocation for Strato.
//!
//! A source tree is packaged into a deterministic, content-hashed archive
//! ([`packager`]), deployed idempotently under a hash-derived identity
//! ([`deployer`]), and invoked over the wire protocol ([`invoker`]). The
//! cloud platform itself sits behind the [`CloudApi`] seam so that the
//! deployment algorithm is testable without a network.

pub mod api;
mod config;
mod deployer;
mod error;
mod invoker;
pub mod packager;

pub use api::{CloudApi, CreateFunctionRequest, HttpCloudApi, Identity, MockCloudApi, RemoteFunction};
pub use config::{DeployConfig, FailurePolicy};
pub use deployer::{Deployer, DeploymentHandle};
pub use error::{DeployError, DeployResult};
pub use invoker::RemoteInvoker;
pub use packager::{Bundle, DirPackager, Packager};

/// Label keys carrying the two halves of the full content hash.
///
/// The hash is split because platform label values have a length limit.
pub mod labels {
    /// First 32 hex characters of the content hash.
    pub const SHA256A: &str = "sha256a";

    /// Remaining hex characters of the content hash.
    pub const SHA256B: &str = "sha256b";
}

/// Maximum archive size accepted by the upload endpoint (100 MiB).
pub const MAX_ARCHIVE_BYTES: u64 = 104_857_600;

/// Number of content-hash characters used in the deployment id.
pub const ID_HASH_LEN: usize = 24;
