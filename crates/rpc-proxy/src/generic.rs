//! `GenericInvoker` (§4.8.1): the untyped call path. Builds an
//! `Invocation` from a method name, parameter types, and
//! `serde_json::Value` arguments, and unwraps the result to a plain
//! `Result` rather than an `RpcResult`.

use rpc_core::{BoxInvoker, Invocation, RpcError};

pub struct GenericInvoker {
    invoker: BoxInvoker,
}

impl GenericInvoker {
    pub fn new(invoker: BoxInvoker) -> Self {
        Self { invoker }
    }

    pub async fn invoke(
        &self,
        method: &str,
        parameter_types: Vec<String>,
        arguments: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value, RpcError> {
        let invocation = Invocation::new(method, parameter_types, arguments);
        self.invoker.invoke(invocation).await.into_std()
    }

    pub fn invoker(&self) -> &BoxInvoker {
        &self.invoker
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        async_trait::async_trait,
        rpc_core::{Invoker, RpcResult},
        rpc_url::Url,
        std::sync::Arc,
    };

    struct Echo;

    #[async_trait]
    impl Invoker for Echo {
        fn interface(&self) -> &str {
            "Hello"
        }
        fn url(&self) -> &Url {
            static URL: std::sync::OnceLock<Url> = std::sync::OnceLock::new();
            URL.get_or_init(|| Url::new("rpc", "h", 1))
        }
        fn is_available(&self) -> bool {
            true
        }
        async fn invoke(&self, invocation: Invocation) -> RpcResult {
            RpcResult::value(invocation.arguments().first().cloned().unwrap_or(serde_json::Value::Null))
        }
        fn destroy(&self) {}
    }

    #[tokio::test]
    async fn generic_invoker_round_trips_arguments() {
        let generic = GenericInvoker::new(Arc::new(Echo));
        let result = generic
            .invoke("echo", vec!["String".into()], vec![serde_json::json!("hi")])
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!("hi"));
    }
}
