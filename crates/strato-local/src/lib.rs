//! Local execution engine for Strato.
//!
//! Executes [`FunctionCall`]s against locally registered implementations
//! while reproducing the concurrency, ordering, retry, and log-durability
//! behaviour of a genuine remote platform. Two modes:
//!
//! - **Shared**: calls run as cooperative tasks inside the host process. No
//!   isolation, no private logs; CPU-bound synchronous work observably
//!   serialises to a concurrency of one. That collapse is a designed,
//!   tested property, not a defect.
//! - **Isolated**: each execution slot owns a child process and an
//!   append-only log file. Crashes are contained to the affected call and
//!   slot; the slot respawns lazily with its log reopened in append mode.
//!
//! All call bookkeeping (queueing, assignment, settlement) happens on a
//! single control-loop task; worker processes provide the only true
//! parallelism.
//!
//! [`FunctionCall`]: strato_proto::FunctionCall

mod engine;
mod error;
mod process;
mod registry;
pub mod worker;

pub use engine::{CallHandle, CleanupOptions, ExecutionMode, LocalEngine, LocalOptions};
pub use error::{LocalError, LocalResult};
pub use registry::FunctionRegistry;
pub use worker::WorkerSpec;
