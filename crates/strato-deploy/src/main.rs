//! Strato deploy CLI - package a bundle and inspect the archive locally.
//!
//! A diagnostic test mode only: it runs the packager against a source
//! directory, writes the archive to disk, and prints the content hash.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use strato_deploy::{DirPackager, Packager};

#[derive(Parser)]
#[command(name = "strato-deploy")]
#[command(about = "Package Strato bundles for inspection")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Package a source directory and write the archive to disk
    Test {
        /// Source directory to package
        source: PathBuf,

        /// Output archive path
        #[arg(short, long, default_value = "dist.zip")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Test { source, output } => test_packager(&source, &output).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn test_packager(source: &PathBuf, output: &PathBuf) -> strato_deploy::DeployResult<()> {
    let packager = DirPackager::new();
    let bundle = packager.build_bundle(source).await?;

    tokio::fs::write(output, &bundle.archive).await?;

    println!("archive: {}", output.display());
    println!("size: {} bytes", bundle.archive.len());
    println!("hash: {}", bundle.content_hash);
    Ok(())
}
