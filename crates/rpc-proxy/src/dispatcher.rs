//! The server-side inverse of [`crate::stub::ServiceStub`] (§4.8.1): a
//! `Dispatcher` maps a method name to a boxed async handler closure over
//! the concrete service implementation, registered at export time.

use {
    async_trait::async_trait,
    dashmap::DashMap,
    futures::future::BoxFuture,
    rpc_core::{Invocation, Invoker, RpcError, RpcResult},
    rpc_url::Url,
};

pub type Handler = Box<dyn Fn(Invocation) -> BoxFuture<'static, RpcResult> + Send + Sync>;

/// A name-to-handler map a service crate builds once at export time
/// (§4.9) and that `rpc-protocol`'s server-side invoker dispatches
/// through. Implements `Invoker` directly so it can sit at the bottom of
/// the provider-side filter chain.
pub struct Dispatcher {
    interface: &'static str,
    url: Url,
    handlers: DashMap<&'static str, Handler>,
}

impl Dispatcher {
    pub fn new(interface: &'static str, url: Url) -> Self {
        Self {
            interface,
            url,
            handlers: DashMap::new(),
        }
    }

    pub fn register(&self, method: &'static str, handler: Handler) {
        self.handlers.insert(method, handler);
    }
}

#[async_trait]
impl Invoker for Dispatcher {
    fn interface(&self) -> &str {
        self.interface
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn invoke(&self, invocation: Invocation) -> RpcResult {
        let Some(handler) = self.handlers.get(invocation.method_name()) else {
            return RpcResult::exception(RpcError::Unknown(format!(
                "no method {:?} on {}",
                invocation.method_name(),
                self.interface
            )));
        };
        let handler = handler.value();
        handler(invocation).await
    }

    fn destroy(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dispatches_to_registered_handler() {
        let dispatcher = Dispatcher::new("Hello", Url::new("rpc", "h", 1));
        dispatcher.register(
            "greet",
            Box::new(|invocation: Invocation| {
                Box::pin(async move {
                    let name = invocation.arguments().first().cloned().unwrap_or_default();
                    RpcResult::value(name)
                })
            }),
        );
        let result = dispatcher
            .invoke(Invocation::new("greet", vec![], vec![serde_json::json!("world")]))
            .await;
        assert_eq!(result.into_std().unwrap(), serde_json::json!("world"));
    }

    #[tokio::test]
    async fn unknown_method_is_an_error() {
        let dispatcher = Dispatcher::new("Hello", Url::new("rpc", "h", 1));
        let result = dispatcher.invoke(Invocation::new("nope", vec![], vec![])).await;
        assert!(result.is_exception());
    }
}
