//! Cloud platform API seam.
//!
//! The deployment and invocation algorithms only ever talk to the platform
//! through [`CloudApi`]. [`HttpCloudApi`] is the real REST client;
//! [`MockCloudApi`] is an in-memory platform with operation counters so the
//! idempotence and collision properties can be asserted without a network.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use strato_proto::TransportEnvelope;
use tracing::debug;

use crate::error::{DeployError, DeployResult};
use crate::MAX_ARCHIVE_BYTES;

/// A deployed function as reported by the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteFunction {
    /// Fully qualified function name.
    pub name: String,

    /// Platform labels, including the content-hash halves.
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// Request body for deployment creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFunctionRequest {
    /// Fully qualified function name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Entry point the platform dispatches to.
    pub entry_point: String,
    /// Execution timeout as a duration string, e.g. `"60s"`.
    pub timeout: String,
    /// Memory available to the function in MiB.
    pub available_memory_mb: u32,
    /// Signed URL the archive was uploaded to.
    pub source_upload_url: String,
    /// Trigger descriptor. An empty object requests an HTTPS trigger.
    pub https_trigger: serde_json::Value,
    /// Labels, including the two content-hash halves.
    pub labels: HashMap<String, String>,
}

/// Identity provider returning the default account/project.
#[async_trait]
pub trait Identity: Send + Sync {
    /// Resolve the default project identifier.
    async fn default_project(&self) -> DeployResult<String>;
}

/// Identity resolved from the `STRATO_PROJECT` environment variable.
#[derive(Debug, Default)]
pub struct EnvIdentity;

#[async_trait]
impl Identity for EnvIdentity {
    async fn default_project(&self) -> DeployResult<String> {
        std::env::var("STRATO_PROJECT")
            .map_err(|_| DeployError::Config("STRATO_PROJECT is not set".to_owned()))
    }
}

/// Operations the deployment engine needs from the platform.
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Look up a deployed function by id.
    ///
    /// Returns `None` if no deployment with that id exists.
    async fn get_function(&self, id: &str) -> DeployResult<Option<RemoteFunction>>;

    /// Request a signed upload URL for a new archive.
    async fn generate_upload_url(&self) -> DeployResult<String>;

    /// Upload an archive to a previously generated URL.
    ///
    /// A single streamed transfer with `content-type: application/zip` and an
    /// explicit byte-range header bounding size to [`MAX_ARCHIVE_BYTES`].
    async fn upload_archive(&self, url: &str, archive: Vec<u8>) -> DeployResult<()>;

    /// Create a deployment.
    async fn create_function(&self, request: &CreateFunctionRequest) -> DeployResult<()>;

    /// Delete a deployment.
    async fn delete_function(&self, id: &str) -> DeployResult<()>;

    /// Invoke a deployed function with a serialised call payload.
    async fn invoke(&self, id: &str, payload: String) -> DeployResult<TransportEnvelope>;
}

/// REST client for a real platform endpoint.
#[derive(Debug, Clone)]
pub struct HttpCloudApi {
    client: Client,
    base_url: String,
    project: String,
    region: String,
}

impl HttpCloudApi {
    /// Create a new platform client.
    ///
    /// The default project is resolved once, up front; every platform path
    /// embeds it together with the configured region.
    pub async fn new(
        base_url: impl Into<String>,
        region: impl Into<String>,
        identity: &dyn Identity,
        timeout: Duration,
    ) -> DeployResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(DeployError::Http)?;

        let project = identity.default_project().await?;
        debug!(project = %project, "resolved default project");

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            project,
            region: region.into(),
        })
    }

    fn location_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}",
            self.base_url, self.project, self.region
        )
    }

    fn function_url(&self, id: &str) -> String {
        format!("{}/functions/{}", self.location_url(), id)
    }
}

#[async_trait]
impl CloudApi for HttpCloudApi {
    async fn get_function(&self, id: &str) -> DeployResult<Option<RemoteFunction>> {
        let response = self
            .client
            .get(self.function_url(id))
            .send()
            .await
            .map_err(DeployError::Http)?;

        match response.status() {
            StatusCode::OK => response.json().await.map(Some).map_err(DeployError::Http),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(DeployError::internal(format!(
                "unexpected status fetching function: {status}"
            ))),
        }
    }

    async fn generate_upload_url(&self) -> DeployResult<String> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct UploadUrlResponse {
            upload_url: String,
        }

        let response = self
            .client
            .post(format!("{}/functions:generateUploadUrl", self.location_url()))
            .send()
            .await
            .map_err(DeployError::Http)?;

        if !response.status().is_success() {
            return Err(DeployError::upload(format!(
                "upload URL request failed: {}",
                response.status()
            )));
        }

        let body: UploadUrlResponse = response.json().await.map_err(DeployError::Http)?;
        Ok(body.upload_url)
    }

    async fn upload_archive(&self, url: &str, archive: Vec<u8>) -> DeployResult<()> {
        let size = archive.len() as u64;
        if size > MAX_ARCHIVE_BYTES {
            return Err(DeployError::upload(format!(
                "archive is {size} bytes, limit is {MAX_ARCHIVE_BYTES}"
            )));
        }

        debug!(url = %url, size, "uploading archive");

        let response = self
            .client
            .put(url)
            .header("content-type", "application/zip")
            .header(
                "x-goog-content-length-range",
                format!("0,{MAX_ARCHIVE_BYTES}"),
            )
            .body(archive)
            .send()
            .await
            .map_err(DeployError::Http)?;

        if !response.status().is_success() {
            return Err(DeployError::upload(format!(
                "archive upload failed: {}",
                response.status()
            )));
        }

        Ok(())
    }

    async fn create_function(&self, request: &CreateFunctionRequest) -> DeployResult<()> {
        let response = self
            .client
            .post(format!("{}/functions", self.location_url()))
            .json(request)
            .send()
            .await
            .map_err(DeployError::Http)?;

        if !response.status().is_success() {
            return Err(DeployError::Create(format!(
                "create returned {}",
                response.status()
            )));
        }

        Ok(())
    }

    async fn delete_function(&self, id: &str) -> DeployResult<()> {
        let response = self
            .client
            .delete(self.function_url(id))
            .send()
            .await
            .map_err(DeployError::Http)?;

        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            return Err(DeployError::internal(format!(
                "delete returned {}",
                response.status()
            )));
        }

        Ok(())
    }

    async fn invoke(&self, id: &str, payload: String) -> DeployResult<TransportEnvelope> {
        #[derive(Serialize)]
        struct CallBody {
            data: String,
        }

        let response = self
            .client
            .post(format!("{}:call", self.function_url(id)))
            .json(&CallBody { data: payload })
            .send()
            .await
            .map_err(|e| DeployError::transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DeployError::transport(format!(
                "invoke returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| DeployError::transport(e.to_string()))
    }
}

/// In-memory platform for tests.
///
/// Records every operation so tests can assert, for example, that a repeat
/// deployment performed zero additional uploads.
#[derive(Debug, Default)]
pub struct MockCloudApi {
    functions: RwLock<HashMap<String, RemoteFunction>>,
    invoke_responses: Mutex<VecDeque<TransportEnvelope>>,
    upload_count: AtomicUsize,
    create_count: AtomicUsize,
    upload_url_count: AtomicUsize,
    delete_count: AtomicUsize,
    fail_create: std::sync::atomic::AtomicBool,
}

impl MockCloudApi {
    /// Creates an empty mock platform.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of archive uploads performed.
    #[must_use]
    pub fn upload_count(&self) -> usize {
        self.upload_count.load(Ordering::SeqCst)
    }

    /// Number of deployment creations performed.
    #[must_use]
    pub fn create_count(&self) -> usize {
        self.create_count.load(Ordering::SeqCst)
    }

    /// Number of upload URLs generated.
    #[must_use]
    pub fn upload_url_count(&self) -> usize {
        self.upload_url_count.load(Ordering::SeqCst)
    }

    /// Number of deletions performed.
    #[must_use]
    pub fn delete_count(&self) -> usize {
        self.delete_count.load(Ordering::SeqCst)
    }

    /// Make subsequent `create_function` calls fail.
    pub fn fail_next_creates(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Queue the envelope returned by the next `invoke`.
    ///
    /// Mock state is plain data, so a poisoned lock is still usable.
    pub fn push_invoke_response(&self, envelope: TransportEnvelope) {
        self.invoke_responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(envelope);
    }

    /// Directly insert a deployed function (for collision scenarios).
    pub fn insert_function(&self, function: RemoteFunction) {
        self.functions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(function.name.clone(), function);
    }
}

#[async_trait]
impl CloudApi for MockCloudApi {
    async fn get_function(&self, id: &str) -> DeployResult<Option<RemoteFunction>> {
        let functions = self.functions.read().unwrap_or_else(PoisonError::into_inner);
        Ok(functions.get(id).cloned())
    }

    async fn generate_upload_url(&self) -> DeployResult<String> {
        let n = self.upload_url_count.fetch_add(1, Ordering::SeqCst);
        Ok(format!("mock://upload/{n}"))
    }

    async fn upload_archive(&self, _url: &str, archive: Vec<u8>) -> DeployResult<()> {
        let size = archive.len() as u64;
        if size > MAX_ARCHIVE_BYTES {
            return Err(DeployError::upload(format!(
                "archive is {size} bytes, limit is {MAX_ARCHIVE_BYTES}"
            )));
        }
        self.upload_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create_function(&self, request: &CreateFunctionRequest) -> DeployResult<()> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(DeployError::Create("mock create failure".to_owned()));
        }

        self.create_count.fetch_add(1, Ordering::SeqCst);
        let mut functions = self
            .functions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        functions.insert(
            request.name.clone(),
            RemoteFunction {
                name: request.name.clone(),
                labels: request.labels.clone(),
            },
        );
        Ok(())
    }

    async fn delete_function(&self, id: &str) -> DeployResult<()> {
        self.delete_count.fetch_add(1, Ordering::SeqCst);
        let mut functions = self
            .functions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        functions.remove(id);
        Ok(())
    }

    async fn invoke(&self, _id: &str, _payload: String) -> DeployResult<TransportEnvelope> {
        let mut queue = self
            .invoke_responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        queue
            .pop_front()
            .ok_or_else(|| DeployError::transport("no queued mock response"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedIdentity(&'static str);

    #[async_trait]
    impl Identity for FixedIdentity {
        async fn default_project(&self) -> DeployResult<String> {
            Ok(self.0.to_owned())
        }
    }

    #[tokio::test]
    async fn http_paths_embed_project_and_region() {
        let api = HttpCloudApi::new(
            "https://platform.test/",
            "europe-west1",
            &FixedIdentity("proj-7"),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(
            api.function_url("fn-1"),
            "https://platform.test/v1/projects/proj-7/locations/europe-west1/functions/fn-1"
        );
        assert_eq!(
            api.location_url(),
            "https://platform.test/v1/projects/proj-7/locations/europe-west1"
        );
    }

    #[tokio::test]
    async fn identity_failure_fails_construction() {
        struct NoIdentity;

        #[async_trait]
        impl Identity for NoIdentity {
            async fn default_project(&self) -> DeployResult<String> {
                Err(DeployError::Config("no default project".to_owned()))
            }
        }

        let result = HttpCloudApi::new(
            "https://platform.test",
            "us-central1",
            &NoIdentity,
            Duration::from_secs(5),
        )
        .await;
        assert!(matches!(result, Err(DeployError::Config(_))));
    }

    #[tokio::test]
    async fn env_identity_reads_the_project_variable() {
        std::env::set_var("STRATO_PROJECT", "env-project");
        let project = EnvIdentity.default_project().await.unwrap();
        std::env::remove_var("STRATO_PROJECT");
        assert_eq!(project, "env-project");
    }

    #[tokio::test]
    async fn mock_state_survives_a_poisoned_lock() {
        let api = MockCloudApi::new();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = api.invoke_responses.lock().unwrap();
            panic!("poison the queue");
        }));

        api.push_invoke_response(TransportEnvelope::ok("{}"));
        let envelope = api.invoke("fn-1", String::new()).await.unwrap();
        assert_eq!(envelope.result.as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn mock_counts_operations() {
        let api = MockCloudApi::new();

        let url = api.generate_upload_url().await.unwrap();
        api.upload_archive(&url, vec![0u8; 16]).await.unwrap();

        assert_eq!(api.upload_url_count(), 1);
        assert_eq!(api.upload_count(), 1);
        assert_eq!(api.create_count(), 0);
    }

    #[tokio::test]
    async fn mock_rejects_oversized_archive() {
        let api = MockCloudApi::new();
        let oversized = vec![0u8; (MAX_ARCHIVE_BYTES + 1) as usize];
        let result = api.upload_archive("mock://upload/0", oversized).await;
        assert!(matches!(result, Err(DeployError::Upload(_))));
    }

    #[tokio::test]
    async fn mock_create_and_lookup() {
        let api = MockCloudApi::new();
        let request = CreateFunctionRequest {
            name: "fn-1".to_owned(),
            description: String::new(),
            entry_point: "trampoline".to_owned(),
            timeout: "60s".to_owned(),
            available_memory_mb: 256,
            source_upload_url: "mock://upload/0".to_owned(),
            https_trigger: serde_json::json!({}),
            labels: HashMap::new(),
        };

        api.create_function(&request).await.unwrap();
        let found = api.get_function("fn-1").await.unwrap();
        assert!(found.is_some());

        api.delete_function("fn-1").await.unwrap();
        assert!(api.get_function("fn-1").await.unwrap().is_none());
    }

    #[test]
    fn create_request_wire_casing() {
        let request = CreateFunctionRequest {
            name: "fn-1".to_owned(),
            description: String::new(),
            entry_point: "trampoline".to_owned(),
            timeout: "60s".to_owned(),
            available_memory_mb: 256,
            source_upload_url: "mock://upload/0".to_owned(),
            https_trigger: serde_json::json!({}),
            labels: HashMap::new(),
        };

        let wire = serde_json::to_value(&request).unwrap();
        assert!(wire.get("entryPoint").is_some());
        assert!(wire.get("availableMemoryMb").is_some());
        assert!(wire.get("httpsTrigger").is_some());
    }
}
