//! Typed function proxies.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use strato_proto::FunctionCall;

use crate::client::CloudClient;
use crate::error::{SdkError, SdkResult};

/// A typed proxy for a named function.
///
/// `A` is the argument list as a tuple (use `()` for no arguments) and `R`
/// the return type. The proxy carries no state beyond the client and the
/// name; whether the function actually exists is only discovered at call
/// time.
pub struct CloudFunction<A, R> {
    client: CloudClient,
    name: String,
    _types: PhantomData<fn(A) -> R>,
}

impl<A, R> CloudFunction<A, R>
where
    A: Serialize,
    R: DeserializeOwned,
{
    pub(crate) fn new(client: CloudClient, name: String) -> Self {
        Self {
            client,
            name,
            _types: PhantomData,
        }
    }

    /// The function name this proxy targets.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Calls the function and decodes its return value.
    pub async fn call(&self, args: A) -> SdkResult<R> {
        let encoded =
            serde_json::to_value(args).map_err(|e| SdkError::Encode(e.to_string()))?;
        // Tuples serialise to arrays and `()` to null; a bare single value
        // becomes a one-element argument list.
        let args = match encoded {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            single => vec![single],
        };

        let value = self
            .client
            .invoke_raw(FunctionCall::new(self.name.clone(), args))
            .await?;
        serde_json::from_value(value).map_err(|e| SdkError::Decode(e.to_string()))
    }
}

impl<A, R> Clone for CloudFunction<A, R> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            name: self.name.clone(),
            _types: PhantomData,
        }
    }
}

impl<A, R> std::fmt::Debug for CloudFunction<A, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudFunction")
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strato_local::{FunctionRegistry, LocalOptions};

    fn client() -> CloudClient {
        let mut registry = FunctionRegistry::new();
        registry.register_fn("add", |(a, b): (i64, i64)| Ok(a + b));
        registry.register_fn("greeting", |(): ()| Ok("hello".to_owned()));
        registry.register_fn("double", |(n,): (i64,)| Ok(n * 2));
        CloudClient::local(registry, LocalOptions::default())
    }

    #[tokio::test]
    async fn typed_call_roundtrip() {
        let add = client().function::<(i64, i64), i64>("add");
        assert_eq!(add.call((19, 23)).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn zero_argument_function() {
        let greeting = client().function::<(), String>("greeting");
        assert_eq!(greeting.call(()).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn single_argument_tuple() {
        let double = client().function::<(i64,), i64>("double");
        assert_eq!(double.call((21,)).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn wrong_return_type_is_a_decode_error() {
        let add = client().function::<(i64, i64), String>("add");
        let result = add.call((1, 2)).await;
        assert!(matches!(result, Err(SdkError::Decode(_))));
    }
}
