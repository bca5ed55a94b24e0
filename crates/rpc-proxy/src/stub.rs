//! The typed client-side path (§4.8.1): a service crate hand-writes (or
//! derives via a thin macro) a struct implementing `ServiceStub`, whose
//! methods build an `Invocation`, delegate to the wrapped invoker, and
//! translate `RpcResult::Exception` into a returned `Err`.

use rpc_core::BoxInvoker;

pub trait ServiceStub: Sized {
    fn wrap(invoker: BoxInvoker) -> Self;
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        async_trait::async_trait,
        rpc_core::{Invocation, Invoker, RpcError, RpcResult},
        rpc_url::Url,
        std::sync::{Arc, OnceLock},
    };

    struct Echo;

    #[async_trait]
    impl Invoker for Echo {
        fn interface(&self) -> &str {
            "Hello"
        }
        fn url(&self) -> &Url {
            static URL: OnceLock<Url> = OnceLock::new();
            URL.get_or_init(|| Url::new("rpc", "h", 1))
        }
        fn is_available(&self) -> bool {
            true
        }
        async fn invoke(&self, invocation: Invocation) -> RpcResult {
            match invocation.arguments().first() {
                Some(value) => RpcResult::value(value.clone()),
                None => RpcResult::exception(RpcError::Unknown("missing argument".into())),
            }
        }
        fn destroy(&self) {}
    }

    struct HelloStub {
        invoker: BoxInvoker,
    }

    impl ServiceStub for HelloStub {
        fn wrap(invoker: BoxInvoker) -> Self {
            Self { invoker }
        }
    }

    impl HelloStub {
        async fn greet(&self, name: &str) -> Result<String, RpcError> {
            let invocation = Invocation::new("greet", vec!["String".into()], vec![serde_json::json!(name)]);
            let value = self.invoker.invoke(invocation).await.into_std()?;
            serde_json::from_value(value).map_err(|e| RpcError::Serialization(e.to_string()))
        }
    }

    #[tokio::test]
    async fn stub_delegates_to_wrapped_invoker() {
        let stub = HelloStub::wrap(Arc::new(Echo));
        assert_eq!(stub.greet("world").await.unwrap(), "world");
    }
}
