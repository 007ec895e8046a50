//! The unified client.
//!
//! A [`CloudClient`] fronts either backend behind one call surface. The
//! backend is initialised lazily on the first call: the remote flavour
//! packages and deploys the source tree, the local flavour starts the
//! execution engine. Concurrent first calls coalesce onto a single
//! initialisation; its outcome, success or failure, is cached for the
//! client's lifetime.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use strato_deploy::{
    CloudApi, DeployConfig, Deployer, DeploymentHandle, DirPackager, Packager, RemoteInvoker,
};
use strato_local::{CleanupOptions, FunctionRegistry, LocalEngine, LocalOptions};
use strato_proto::FunctionCall;
use tokio::sync::OnceCell;
use tracing::info;

use crate::error::{SdkError, SdkResult};
use crate::function::CloudFunction;

enum Backend {
    Remote {
        source: PathBuf,
        packager: Box<dyn Packager>,
        api: Arc<dyn CloudApi>,
        config: DeployConfig,
    },
    Local {
        // Consumed by the winning initialiser.
        pending: Mutex<Option<(FunctionRegistry, LocalOptions)>>,
    },
}

enum Ready {
    Remote {
        deployer: Deployer,
        invoker: RemoteInvoker,
        handle: DeploymentHandle,
    },
    Local {
        engine: LocalEngine,
    },
}

struct Inner {
    backend: Backend,
    ready: OnceCell<Result<Ready, String>>,
}

/// Client cleanup behaviour.
#[derive(Debug, Clone, Copy)]
pub struct ClientCleanup {
    /// Abort in-flight local calls rather than draining them.
    pub kill: bool,
    /// Delete backend resources: the remote deployment, or local log files.
    pub delete_resources: bool,
}

impl Default for ClientCleanup {
    fn default() -> Self {
        Self {
            kill: true,
            delete_resources: false,
        }
    }
}

/// Calls functions through whichever backend the client was built with.
#[derive(Clone)]
pub struct CloudClient {
    inner: Arc<Inner>,
}

impl CloudClient {
    /// Client that packages `source` and deploys it on first use.
    pub fn remote(
        source: impl Into<PathBuf>,
        api: Arc<dyn CloudApi>,
        config: DeployConfig,
    ) -> Self {
        Self::from_backend(Backend::Remote {
            source: source.into(),
            packager: Box::new(DirPackager::new()),
            api,
            config,
        })
    }

    /// Like [`remote`](Self::remote) with a custom packaging strategy.
    pub fn remote_with_packager(
        source: impl Into<PathBuf>,
        packager: Box<dyn Packager>,
        api: Arc<dyn CloudApi>,
        config: DeployConfig,
    ) -> Self {
        Self::from_backend(Backend::Remote {
            source: source.into(),
            packager,
            api,
            config,
        })
    }

    /// Client that executes against a local engine started on first use.
    pub fn local(registry: FunctionRegistry, options: LocalOptions) -> Self {
        Self::from_backend(Backend::Local {
            pending: Mutex::new(Some((registry, options))),
        })
    }

    fn from_backend(backend: Backend) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                ready: OnceCell::new(),
            }),
        }
    }

    /// A typed proxy for the named function.
    ///
    /// `A` is the argument list as a tuple, `R` the return type. Building the
    /// proxy is free; nothing is validated until it is called.
    #[must_use]
    pub fn function<A, R>(&self, name: impl Into<String>) -> CloudFunction<A, R>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        CloudFunction::new(self.clone(), name.into())
    }

    /// Invokes a function by name with raw JSON arguments.
    pub async fn invoke_raw(&self, call: FunctionCall) -> SdkResult<Value> {
        match self.ready().await? {
            Ready::Remote {
                invoker, handle, ..
            } => Ok(invoker.call(handle, &call).await?),
            Ready::Local { engine } => Ok(engine.submit(call).await.join().await?),
        }
    }

    /// Stops the backend.
    ///
    /// A client that never initialised has nothing to stop and returns
    /// immediately. For remote backends `delete_resources` tears down the
    /// deployment; for local backends it deletes the log directory.
    pub async fn cleanup(&self, options: ClientCleanup) -> SdkResult<()> {
        let Some(Ok(ready)) = self.inner.ready.get() else {
            return Ok(());
        };
        match ready {
            Ready::Remote {
                deployer, handle, ..
            } => {
                if options.delete_resources {
                    deployer.teardown(handle).await?;
                }
                Ok(())
            }
            Ready::Local { engine } => {
                engine
                    .cleanup(CleanupOptions {
                        kill: options.kill,
                        delete_logs: options.delete_resources,
                    })
                    .await?;
                Ok(())
            }
        }
    }

    async fn ready(&self) -> SdkResult<&Ready> {
        let result = self
            .inner
            .ready
            .get_or_init(|| initialise(&self.inner.backend))
            .await;
        match result {
            Ok(ready) => Ok(ready),
            Err(message) => Err(SdkError::Init(message.clone())),
        }
    }
}

impl std::fmt::Debug for CloudClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match self.inner.backend {
            Backend::Remote { ref source, .. } => format!("remote({})", source.display()),
            Backend::Local { .. } => "local".to_owned(),
        };
        f.debug_struct("CloudClient")
            .field("backend", &backend)
            .field("initialised", &self.inner.ready.initialized())
            .finish()
    }
}

async fn initialise(backend: &Backend) -> Result<Ready, String> {
    match backend {
        Backend::Remote {
            source,
            packager,
            api,
            config,
        } => {
            info!(source = %source.display(), "initialising remote backend");
            let bundle = packager
                .build_bundle(source)
                .await
                .map_err(|e| e.to_string())?;
            let deployer = Deployer::new(Arc::clone(api), config.clone());
            let handle = deployer
                .ensure_deployment(&bundle)
                .await
                .map_err(|e| e.to_string())?;
            let invoker = RemoteInvoker::new(Arc::clone(api));
            Ok(Ready::Remote {
                deployer,
                invoker,
                handle,
            })
        }
        Backend::Local { pending } => {
            info!("initialising local backend");
            let (registry, options) = pending
                .lock()
                .map_err(|_| "engine state poisoned".to_owned())?
                .take()
                .ok_or_else(|| "local engine already started".to_owned())?;
            let engine = LocalEngine::start(registry, options).map_err(|e| e.to_string())?;
            Ok(Ready::Local { engine })
        }
    }
}
