//! Lets the same local implementation be exported under several distinct
//! URLs (one per (protocol, registry) pair, §4.9) without the
//! implementation itself knowing about any of them: [`Invoker::url`] is
//! overridden, everything else delegates straight through.

use {
    async_trait::async_trait,
    rpc_core::{BoxInvoker, Invocation, Invoker, RpcResult},
    rpc_url::Url,
};

pub struct UrlBoundInvoker {
    inner: BoxInvoker,
    url: Url,
}

impl UrlBoundInvoker {
    pub fn new(inner: BoxInvoker, url: Url) -> BoxInvoker {
        std::sync::Arc::new(Self { inner, url })
    }
}

#[async_trait]
impl Invoker for UrlBoundInvoker {
    fn interface(&self) -> &str {
        self.inner.interface()
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    async fn invoke(&self, invocation: Invocation) -> RpcResult {
        self.inner.invoke(invocation).await
    }

    fn destroy(&self) {
        self.inner.destroy()
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rpc_core::RpcResult, std::sync::Arc};

    struct Echo {
        url: Url,
    }

    #[async_trait]
    impl Invoker for Echo {
        fn interface(&self) -> &str {
            "com.example.Echo"
        }
        fn url(&self) -> &Url {
            &self.url
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
    async fn url_is_overridden_but_behavior_delegates() {
        let echo: BoxInvoker = Arc::new(Echo {
            url: Url::new("rpc", "127.0.0.1", 1),
        });
        let overridden_url = Url::new("rpc", "10.0.0.5", 30000).with_path("com.example.Echo");
        let bound = UrlBoundInvoker::new(echo, overridden_url.clone());

        assert_eq!(bound.url(), &overridden_url);
        assert_eq!(bound.interface(), "com.example.Echo");
        let result = bound
            .invoke(Invocation::new("echo", vec![], vec![serde_json::json!("hi")]))
            .await;
        assert_eq!(result.into_std().unwrap(), serde_json::json!("hi"));
    }
}
