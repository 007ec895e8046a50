//! Worker binary serving the harness function set.
//!
//! Spawned by the isolated-mode tests. Protocol frames use stdin/stdout, so
//! tracing output must go to stderr, where the parent collects it into the
//! slot log.

use strato_harness::test_registry;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), strato_local::LocalError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    strato_local::worker::run(test_registry()).await
}
