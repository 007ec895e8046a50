//! Local function registry.
//!
//! Maps function names to boxed handlers taking the JSON argument list.
//! Resolution happens at call time: an unknown name produces the error
//! return, never a construction-time failure.

use std::collections::HashMap;
use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use strato_proto::FunctionCall;

type Handler = Box<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, String>> + Send + Sync>;

/// Registry of locally executable functions.
#[derive(Default)]
pub struct FunctionRegistry {
    handlers: HashMap<String, Handler>,
}

impl FunctionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered functions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if no functions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registers an async function.
    ///
    /// `A` is the full argument list as a tuple; tuples deserialise from the
    /// JSON args array, so a two-argument function registers with
    /// `A = (T0, T1)`. Later registrations under the same name replace
    /// earlier ones.
    pub fn register<A, R, F, Fut>(&mut self, name: impl Into<String>, f: F)
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, String>> + Send + 'static,
    {
        let name = name.into();
        let wire_name = name.clone();
        let handler: Handler = Box::new(move |args: Vec<Value>| {
            // Zero-argument handlers take `()`, which deserialises from null
            // rather than from an empty array.
            let wire_args = if args.is_empty() {
                Value::Null
            } else {
                Value::Array(args)
            };
            let args = match serde_json::from_value::<A>(wire_args) {
                Ok(args) => args,
                Err(e) => {
                    let message = format!("invalid arguments for {wire_name}: {e}");
                    return async move { Err(message) }.boxed();
                }
            };
            let fut = f(args);
            async move {
                let value = fut.await?;
                serde_json::to_value(value).map_err(|e| format!("unserialisable result: {e}"))
            }
            .boxed()
        });
        self.handlers.insert(name, handler);
    }

    /// Registers a synchronous function.
    pub fn register_fn<A, R, F>(&mut self, name: impl Into<String>, f: F)
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(A) -> Result<R, String> + Send + Sync + 'static,
    {
        self.register(name, move |args: A| {
            let result = f(args);
            async move { result }
        });
    }

    /// Executes `call` against the registry.
    ///
    /// Panics in the handler are caught and surfaced as the error string, so
    /// a misbehaving callee cannot take the engine (or a worker) down with
    /// an unwind.
    pub async fn invoke(&self, call: &FunctionCall) -> Result<Value, String> {
        let Some(handler) = self.handlers.get(&call.name) else {
            return Err(format!("function not found: {}", call.name));
        };

        let fut = handler(call.args.clone());
        match std::panic::AssertUnwindSafe(fut).catch_unwind().await {
            Ok(result) => result,
            Err(_) => Err(format!("function panicked: {}", call.name)),
        }
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, args: Vec<Value>) -> FunctionCall {
        FunctionCall::new(name, args)
    }

    #[tokio::test]
    async fn sync_function_roundtrip() {
        let mut registry = FunctionRegistry::new();
        registry.register_fn("add", |(a, b): (i64, i64)| Ok(a + b));

        let result = registry.invoke(&call("add", vec![json!(2), json!(3)])).await;
        assert_eq!(result, Ok(json!(5)));
    }

    #[tokio::test]
    async fn async_function_roundtrip() {
        let mut registry = FunctionRegistry::new();
        registry.register("greet", |(name,): (String,)| async move {
            Ok(format!("hello {name}"))
        });

        let result = registry.invoke(&call("greet", vec![json!("world")])).await;
        assert_eq!(result, Ok(json!("hello world")));
    }

    #[tokio::test]
    async fn unknown_name_fails_at_call_time() {
        let registry = FunctionRegistry::new();
        let result = registry.invoke(&call("missing", vec![])).await;
        assert_eq!(result, Err("function not found: missing".to_owned()));
    }

    #[tokio::test]
    async fn bad_arguments_fail_with_message() {
        let mut registry = FunctionRegistry::new();
        registry.register_fn("add", |(a, b): (i64, i64)| Ok(a + b));

        let result = registry.invoke(&call("add", vec![json!("two")])).await;
        let err = result.unwrap_err();
        assert!(err.starts_with("invalid arguments for add"), "{err}");
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let mut registry = FunctionRegistry::new();
        registry.register_fn("explode", |(): ()| -> Result<(), String> {
            panic!("kaboom")
        });

        let result = registry.invoke(&call("explode", vec![])).await;
        assert_eq!(result, Err("function panicked: explode".to_owned()));
    }

    #[tokio::test]
    async fn handler_error_propagates_message_only() {
        let mut registry = FunctionRegistry::new();
        registry.register_fn("fail", |(msg,): (String,)| -> Result<(), String> {
            Err(msg)
        });

        let result = registry.invoke(&call("fail", vec![json!("nope")])).await;
        assert_eq!(result, Err("nope".to_owned()));
    }
}
