//! End-to-end client flows: deployment idempotence across clients, collision
//! refusal, and typed calls through an isolated local backend.

use std::collections::HashMap;
use std::sync::Arc;

use strato_deploy::{
    labels, CloudApi, DeployConfig, DeployError, Deployer, DirPackager, MockCloudApi, Packager,
    RemoteFunction,
};
use strato_harness::test_registry;
use strato_local::{ExecutionMode, LocalOptions, WorkerSpec};
use strato_proto::{FunctionReturn, TransportEnvelope};
use strato_sdk::{ClientCleanup, CloudClient, SdkError};
use tempfile::TempDir;

fn write_source(dir: &TempDir) {
    std::fs::write(dir.path().join("index.txt"), b"trampoline source").unwrap();
}

fn remote_client(api: &Arc<MockCloudApi>, source: &TempDir) -> CloudClient {
    CloudClient::remote(
        source.path(),
        Arc::clone(api) as Arc<dyn CloudApi>,
        DeployConfig::default(),
    )
}

fn ok_envelope(value: serde_json::Value) -> TransportEnvelope {
    TransportEnvelope::ok(serde_json::to_string(&FunctionReturn::returned(value)).unwrap())
}

#[tokio::test]
async fn second_client_reuses_the_deployment() {
    let api = Arc::new(MockCloudApi::new());
    let source = TempDir::new().unwrap();
    write_source(&source);

    let first = remote_client(&api, &source);
    api.push_invoke_response(ok_envelope(serde_json::json!(1)));
    first
        .function::<(), i64>("probe")
        .call(())
        .await
        .unwrap();
    assert_eq!(api.create_count(), 1);
    assert_eq!(api.upload_count(), 1);

    // A fresh client over the unchanged tree hashes identically and performs
    // zero additional platform writes.
    let second = remote_client(&api, &source);
    api.push_invoke_response(ok_envelope(serde_json::json!(2)));
    second
        .function::<(), i64>("probe")
        .call(())
        .await
        .unwrap();
    assert_eq!(api.create_count(), 1);
    assert_eq!(api.upload_count(), 1);
}

#[tokio::test]
async fn occupied_id_with_different_hash_is_refused() {
    let api = Arc::new(MockCloudApi::new());
    let source = TempDir::new().unwrap();
    write_source(&source);

    // Plant an unrelated deployment at the id this source would claim.
    let bundle = DirPackager::new()
        .build_bundle(source.path())
        .await
        .unwrap();
    let deployer = Deployer::new(
        Arc::clone(&api) as Arc<dyn CloudApi>,
        DeployConfig::default(),
    );
    let id = deployer.deployment_id(&bundle.content_hash);
    let mut foreign = HashMap::new();
    foreign.insert(labels::SHA256A.to_owned(), "0".repeat(32));
    foreign.insert(labels::SHA256B.to_owned(), "0".repeat(32));
    api.insert_function(RemoteFunction {
        name: id.clone(),
        labels: foreign,
    });

    let result = deployer.ensure_deployment(&bundle).await;
    assert!(matches!(result, Err(DeployError::Collision { .. })));
    assert!(api.get_function(&id).await.unwrap().is_some());
    assert_eq!(api.upload_count(), 0);
    assert_eq!(api.create_count(), 0);
}

#[tokio::test]
async fn typed_calls_flow_through_isolated_workers() {
    let logs = TempDir::new().unwrap();
    let client = CloudClient::local(
        test_registry(),
        LocalOptions {
            mode: ExecutionMode::Isolated,
            concurrency: 2,
            log_dir: Some(logs.path().to_owned()),
            worker: WorkerSpec::program(env!("CARGO_BIN_EXE_strato-test-worker")),
            ..LocalOptions::default()
        },
    );

    let hello = client.function::<(String,), String>("hello");
    assert_eq!(hello.call(("isolated".to_owned(),)).await.unwrap(), "hello isolated");

    let fail = client.function::<(String,), ()>("fail");
    let result = fail.call(("expected failure".to_owned(),)).await;
    assert!(matches!(result, Err(SdkError::Local(_))));

    client
        .cleanup(ClientCleanup {
            kill: true,
            delete_resources: true,
        })
        .await
        .unwrap();
}
