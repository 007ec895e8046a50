//! Bundle packaging with deterministic content hashing.
//!
//! The archive bytes are a pure function of the source tree: entries are
//! written in sorted path order with fixed timestamps, so an unchanged tree
//! always hashes to the same digest. That determinism is what makes
//! deployment idempotent.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::task::spawn_blocking;
use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{DeployError, DeployResult};

/// A packaged bundle: archive bytes plus their content hash.
#[derive(Debug, Clone)]
pub struct Bundle {
    /// Zip archive of the source tree.
    pub archive: Vec<u8>,

    /// Hex-encoded SHA-256 of the archive bytes.
    pub content_hash: String,
}

impl Bundle {
    /// Builds a bundle from raw archive bytes, computing the hash.
    #[must_use]
    pub fn from_archive(archive: Vec<u8>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(&archive);
        let content_hash = hex::encode(hasher.finalize());
        Self {
            archive,
            content_hash,
        }
    }

    /// Archive size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.archive.len() as u64
    }
}

/// Turns a source reference into an archive plus content hash.
#[async_trait]
pub trait Packager: Send + Sync {
    /// Package the source at `source` into a bundle.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Packaging`] if the source cannot be resolved
    /// into a self-contained bundle.
    async fn build_bundle(&self, source: &Path) -> DeployResult<Bundle>;
}

/// Packages a source directory into a deterministic zip archive.
#[derive(Debug, Default)]
pub struct DirPackager;

impl DirPackager {
    /// Creates a new directory packager.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Packager for DirPackager {
    async fn build_bundle(&self, source: &Path) -> DeployResult<Bundle> {
        let source = source.to_owned();
        spawn_blocking(move || build_bundle_sync(&source))
            .await
            .map_err(|e| DeployError::internal(format!("packaging task failed: {e}")))?
    }
}

fn build_bundle_sync(source: &Path) -> DeployResult<Bundle> {
    if !source.is_dir() {
        return Err(DeployError::packaging(format!(
            "source is not a directory: {}",
            source.display()
        )));
    }

    let mut paths = walkdir(source)?;
    // Sorted order makes the archive byte-for-byte reproducible.
    paths.sort();

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());

    for path in paths {
        let relative = path
            .strip_prefix(source)
            .map_err(|e| DeployError::packaging(format!("path outside source tree: {e}")))?;
        let name = relative.to_string_lossy().replace('\\', "/");

        if path.is_dir() {
            writer
                .add_directory(name, options)
                .map_err(|e| DeployError::packaging(format!("archive error: {e}")))?;
        } else {
            let contents = std::fs::read(&path).map_err(|e| {
                DeployError::packaging(format!("cannot read {}: {e}", path.display()))
            })?;
            writer
                .start_file(name, options)
                .map_err(|e| DeployError::packaging(format!("archive error: {e}")))?;
            writer
                .write_all(&contents)
                .map_err(|e| DeployError::packaging(format!("archive error: {e}")))?;
        }
    }

    let cursor = writer
        .finish()
        .map_err(|e| DeployError::packaging(format!("archive error: {e}")))?;
    let bundle = Bundle::from_archive(cursor.into_inner());

    debug!(
        source = %source.display(),
        size = bundle.archive.len(),
        hash = %bundle.content_hash,
        "bundle packaged"
    );

    Ok(bundle)
}

fn walkdir(path: &Path) -> DeployResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(path)
        .map_err(|e| DeployError::packaging(format!("cannot read {}: {e}", path.display())))?;
    let mut paths = Vec::new();

    for entry in entries {
        let entry = entry.map_err(DeployError::Io)?;
        let path = entry.path();
        paths.push(path.clone());

        if path.is_dir() {
            paths.extend(walkdir(&path)?);
        }
    }

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_tree(dir: &Path) {
        std::fs::create_dir_all(dir.join("sub")).unwrap();
        std::fs::write(dir.join("main.txt"), b"entry point").unwrap();
        std::fs::write(dir.join("sub/module.txt"), b"module").unwrap();
    }

    #[tokio::test]
    async fn same_tree_same_hash() {
        let dir = TempDir::new().unwrap();
        write_tree(dir.path());

        let packager = DirPackager::new();
        let first = packager.build_bundle(dir.path()).await.unwrap();
        let second = packager.build_bundle(dir.path()).await.unwrap();

        assert_eq!(first.content_hash, second.content_hash);
        assert_eq!(first.archive, second.archive);
    }

    #[tokio::test]
    async fn changed_tree_changes_hash() {
        let dir = TempDir::new().unwrap();
        write_tree(dir.path());

        let packager = DirPackager::new();
        let first = packager.build_bundle(dir.path()).await.unwrap();

        std::fs::write(dir.path().join("main.txt"), b"changed").unwrap();
        let second = packager.build_bundle(dir.path()).await.unwrap();

        assert_ne!(first.content_hash, second.content_hash);
    }

    #[tokio::test]
    async fn missing_source_fails() {
        let packager = DirPackager::new();
        let result = packager.build_bundle(Path::new("/nonexistent/source")).await;
        assert!(matches!(result, Err(DeployError::Packaging(_))));
    }

    #[test]
    fn hash_is_hex_sha256() {
        let bundle = Bundle::from_archive(vec![1, 2, 3]);
        assert_eq!(bundle.content_hash.len(), 64);
        assert!(bundle.content_hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
