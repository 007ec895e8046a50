//! Idempotent, content-addressed deployment.
//!
//! A deployment's identity is a function of its bundle's content hash. The
//! full hash travels in two label halves (platform label values are length
//! limited); on lookup the halves are reassembled and compared, so an
//! unchanged bundle is a no-op and a truncated-id collision is refused
//! rather than silently overwritten.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::api::{CloudApi, CreateFunctionRequest, RemoteFunction};
use crate::config::{DeployConfig, FailurePolicy};
use crate::error::{DeployError, DeployResult};
use crate::packager::Bundle;
use crate::{labels, ID_HASH_LEN, MAX_ARCHIVE_BYTES};

/// Handle to an ensured deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentHandle {
    /// Deployment id, derived from the truncated content hash.
    pub id: String,

    /// Full content hash of the deployed bundle.
    pub content_hash: String,
}

/// Ensures remote deployments exist, keyed by content hash.
pub struct Deployer {
    api: Arc<dyn CloudApi>,
    config: DeployConfig,
}

impl Deployer {
    /// Create a new deployer.
    pub fn new(api: Arc<dyn CloudApi>, config: DeployConfig) -> Self {
        Self { api, config }
    }

    /// The deployment id for a bundle with the given content hash.
    #[must_use]
    pub fn deployment_id(&self, content_hash: &str) -> String {
        let truncated = &content_hash[..ID_HASH_LEN.min(content_hash.len())];
        format!("{}-{}", self.config.prefix, truncated)
    }

    /// Ensure a deployment for `bundle` exists.
    ///
    /// Idempotent: an unchanged bundle performs zero upload or create
    /// operations and reuses the existing deployment.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Collision`] if the truncated id is occupied by
    /// a bundle with a different full hash. The existing deployment is left
    /// untouched. Creation failures follow the configured
    /// [`FailurePolicy`].
    pub async fn ensure_deployment(&self, bundle: &Bundle) -> DeployResult<DeploymentHandle> {
        let id = self.deployment_id(&bundle.content_hash);
        let handle = DeploymentHandle {
            id: id.clone(),
            content_hash: bundle.content_hash.clone(),
        };

        if let Some(existing) = self.api.get_function(&id).await? {
            return self.check_existing(&existing, handle);
        }

        if bundle.size() > MAX_ARCHIVE_BYTES {
            return Err(DeployError::upload(format!(
                "archive is {} bytes, limit is {MAX_ARCHIVE_BYTES}",
                bundle.size()
            )));
        }

        let upload_url = self.api.generate_upload_url().await?;
        self.api
            .upload_archive(&upload_url, bundle.archive.clone())
            .await?;

        let request = self.create_request(&id, &bundle.content_hash, upload_url);
        match self.api.create_function(&request).await {
            Ok(()) => {
                info!(id = %id, hash = %bundle.content_hash, "deployment created");
            }
            Err(e) => match self.config.failure_policy {
                FailurePolicy::Strict => return Err(e),
                FailurePolicy::Lenient => {
                    warn!(id = %id, error = %e, "deployment creation failed, continuing");
                }
            },
        }

        Ok(handle)
    }

    /// Delete the deployment behind `handle`.
    pub async fn teardown(&self, handle: &DeploymentHandle) -> DeployResult<()> {
        info!(id = %handle.id, "tearing down deployment");
        self.api.delete_function(&handle.id).await
    }

    fn check_existing(
        &self,
        existing: &RemoteFunction,
        handle: DeploymentHandle,
    ) -> DeployResult<DeploymentHandle> {
        let previous = format!(
            "{}{}",
            existing.labels.get(labels::SHA256A).map_or("", String::as_str),
            existing.labels.get(labels::SHA256B).map_or("", String::as_str),
        );

        if !previous.is_empty() && previous == handle.content_hash {
            info!(id = %handle.id, "deployment unchanged, hash matches");
            return Ok(handle);
        }

        Err(DeployError::Collision {
            id: handle.id,
            existing: previous,
            local: handle.content_hash,
        })
    }

    fn create_request(
        &self,
        id: &str,
        content_hash: &str,
        upload_url: String,
    ) -> CreateFunctionRequest {
        let (sha256a, sha256b) = content_hash.split_at(content_hash.len().min(32));
        let mut hash_labels = HashMap::new();
        hash_labels.insert(labels::SHA256A.to_owned(), sha256a.to_owned());
        hash_labels.insert(labels::SHA256B.to_owned(), sha256b.to_owned());

        CreateFunctionRequest {
            name: id.to_owned(),
            description: self.config.description.clone(),
            entry_point: self.config.entry_point.clone(),
            timeout: self.config.timeout_string(),
            available_memory_mb: self.config.available_memory_mb,
            source_upload_url: upload_url,
            https_trigger: serde_json::json!({}),
            labels: hash_labels,
        }
    }
}
