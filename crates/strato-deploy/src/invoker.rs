//! Remote invocation over the wire protocol.

use std::sync::Arc;

use serde_json::Value;
use strato_proto::{FunctionCall, FunctionReturn, TransportEnvelope};
use tracing::debug;

use crate::api::CloudApi;
use crate::deployer::DeploymentHandle;
use crate::error::{DeployError, DeployResult};

/// Sends calls to a deployed endpoint and decodes the return envelope.
pub struct RemoteInvoker {
    api: Arc<dyn CloudApi>,
}

impl RemoteInvoker {
    /// Create a new invoker.
    pub fn new(api: Arc<dyn CloudApi>) -> Self {
        Self { api }
    }

    /// Invoke `call` on the deployment behind `handle`.
    ///
    /// Two independent failure layers: a transport-level `error` in the
    /// envelope rejects immediately with [`DeployError::Transport`] without
    /// parsing the payload; an error-variant [`FunctionReturn`] rejects with
    /// [`DeployError::Application`]. Otherwise the raw success value is
    /// returned; typed decoding is the caller's contract.
    pub async fn call(&self, handle: &DeploymentHandle, call: &FunctionCall) -> DeployResult<Value> {
        let payload =
            serde_json::to_string(call).map_err(strato_proto::ProtoError::Serialise)?;

        debug!(id = %handle.id, function = %call.name, "invoking remote function");

        let envelope = self.api.invoke(&handle.id, payload).await?;
        decode_envelope(envelope)
    }
}

fn decode_envelope(envelope: TransportEnvelope) -> DeployResult<Value> {
    if let Some(error) = envelope.error {
        return Err(DeployError::Transport(error));
    }

    let result = envelope
        .result
        .ok_or_else(|| DeployError::transport("envelope carried neither result nor error"))?;

    let returned: FunctionReturn =
        serde_json::from_str(&result).map_err(strato_proto::ProtoError::Deserialise)?;

    returned.into_result().map_err(DeployError::Application)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockCloudApi;
    use serde_json::json;

    fn handle() -> DeploymentHandle {
        DeploymentHandle {
            id: "strato-trampoline-abc".to_owned(),
            content_hash: "abc".to_owned(),
        }
    }

    fn invoker(api: &Arc<MockCloudApi>) -> RemoteInvoker {
        RemoteInvoker::new(Arc::clone(api) as Arc<dyn CloudApi>)
    }

    #[tokio::test]
    async fn success_value_is_returned() {
        let api = Arc::new(MockCloudApi::new());
        let body = serde_json::to_string(&FunctionReturn::returned(json!(41))).unwrap();
        api.push_invoke_response(TransportEnvelope::ok(body));

        let call = FunctionCall::new("answer", vec![]);
        let value = invoker(&api).call(&handle(), &call).await.unwrap();
        assert_eq!(value, json!(41));
    }

    #[tokio::test]
    async fn transport_error_preempts_payload() {
        let api = Arc::new(MockCloudApi::new());
        // A transport error alongside garbage that must never be parsed.
        api.push_invoke_response(TransportEnvelope {
            error: Some("gateway timeout".to_owned()),
            result: Some("not even json".to_owned()),
        });

        let call = FunctionCall::new("answer", vec![]);
        let result = invoker(&api).call(&handle(), &call).await;
        match result {
            Err(DeployError::Transport(msg)) => assert_eq!(msg, "gateway timeout"),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn application_error_carries_message() {
        let api = Arc::new(MockCloudApi::new());
        let body = serde_json::to_string(&FunctionReturn::error("callee threw")).unwrap();
        api.push_invoke_response(TransportEnvelope::ok(body));

        let call = FunctionCall::new("boom", vec![json!(1)]);
        let result = invoker(&api).call(&handle(), &call).await;
        match result {
            Err(DeployError::Application(msg)) => assert_eq!(msg, "callee threw"),
            other => panic!("expected application error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_envelope_is_a_transport_error() {
        let api = Arc::new(MockCloudApi::new());
        api.push_invoke_response(TransportEnvelope::default());

        let call = FunctionCall::new("answer", vec![]);
        let result = invoker(&api).call(&handle(), &call).await;
        assert!(matches!(result, Err(DeployError::Transport(_))));
    }
}
