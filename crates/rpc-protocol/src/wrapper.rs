//! Decorator layer over a base [`rpc_core::Protocol`] (§4.5): composable
//! `Arc<dyn Protocol>` wrappers, mirroring the `Directory`/`Invoker`
//! wrapper pattern used elsewhere in the pipeline (`FilterInvoker`,
//! `ClusterInvoker`). `ProtocolFilterWrapper` threads every export/refer
//! through the filter chain (§4.7); `ProtocolListenerWrapper` notifies an
//! [`ExporterListener`] of export/unexport events without either side
//! needing to know the other exists.

use {
    async_trait::async_trait,
    rpc_core::{BoxExporter, BoxInvoker, Exporter, Protocol, RpcError},
    rpc_extension::ExtensionLoader,
    rpc_filter::Filter,
    rpc_url::Url,
    std::sync::Arc,
};

pub struct ProtocolFilterWrapper {
    inner: Arc<dyn Protocol>,
    loader: Arc<ExtensionLoader<dyn Filter>>,
}

impl ProtocolFilterWrapper {
    pub fn new(inner: Arc<dyn Protocol>, loader: Arc<ExtensionLoader<dyn Filter>>) -> Arc<Self> {
        Arc::new(Self { inner, loader })
    }
}

#[async_trait]
impl Protocol for ProtocolFilterWrapper {
    async fn export(&self, invoker: BoxInvoker) -> Result<BoxExporter, RpcError> {
        let url = invoker.url().clone();
        let chained = rpc_filter::build_chain(&self.loader, &url, "provider", invoker)
            .map_err(|err| RpcError::Unknown(format!("building provider filter chain for {url}: {err}")))?;
        self.inner.export(chained).await
    }

    async fn refer(&self, interface: &str, url: Url) -> Result<BoxInvoker, RpcError> {
        let invoker = self.inner.refer(interface, url.clone()).await?;
        rpc_filter::build_chain(&self.loader, &url, "consumer", invoker)
            .map_err(|err| RpcError::Unknown(format!("building consumer filter chain for {url}: {err}")))
    }
}

/// Narrow capability interface (§9: explicit per-event-kind interfaces
/// rather than a listener base class) for code that needs to react to
/// export/unexport without being on the call path itself — e.g. the
/// orchestrator's shutdown hook unexporting everything still registered.
pub trait ExporterListener: Send + Sync {
    fn exported(&self, url: &Url);
    fn unexported(&self, url: &Url);
}

pub struct ProtocolListenerWrapper {
    inner: Arc<dyn Protocol>,
    listener: Arc<dyn ExporterListener>,
}

impl ProtocolListenerWrapper {
    pub fn new(inner: Arc<dyn Protocol>, listener: Arc<dyn ExporterListener>) -> Arc<Self> {
        Arc::new(Self { inner, listener })
    }
}

#[async_trait]
impl Protocol for ProtocolListenerWrapper {
    async fn export(&self, invoker: BoxInvoker) -> Result<BoxExporter, RpcError> {
        let url = invoker.url().clone();
        let exporter = self.inner.export(invoker).await?;
        self.listener.exported(&url);
        Ok(Arc::new(ListenerExporter {
            inner: exporter,
            listener: self.listener.clone(),
        }))
    }

    async fn refer(&self, interface: &str, url: Url) -> Result<BoxInvoker, RpcError> {
        self.inner.refer(interface, url).await
    }
}

struct ListenerExporter {
    inner: BoxExporter,
    listener: Arc<dyn ExporterListener>,
}

impl Exporter for ListenerExporter {
    fn url(&self) -> &Url {
        self.inner.url()
    }

    fn unexport(&self) {
        self.inner.unexport();
        self.listener.unexported(self.inner.url());
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::exporter::RpcProtocol,
        rpc_core::{Invocation, Invoker, RpcResult},
        std::sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

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

    struct CountingListener {
        exports: AtomicUsize,
        unexports: AtomicUsize,
    }

    impl ExporterListener for CountingListener {
        fn exported(&self, _url: &Url) {
            self.exports.fetch_add(1, Ordering::SeqCst);
        }
        fn unexported(&self, _url: &Url) {
            self.unexports.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn listener_wrapper_fires_export_and_unexport() {
        let base: Arc<dyn Protocol> = RpcProtocol::new();
        let listener = Arc::new(CountingListener {
            exports: AtomicUsize::new(0),
            unexports: AtomicUsize::new(0),
        });
        let wrapped = ProtocolListenerWrapper::new(base, listener.clone());

        let url = Url::new("rpc", "127.0.0.1", 0).with_path("com.example.Echo");
        let exporter = wrapped.export(Arc::new(Echo { url })).await.unwrap();
        assert_eq!(listener.exports.load(Ordering::SeqCst), 1);
        exporter.unexport();
        assert_eq!(listener.unexports.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn filter_wrapper_exports_through_the_provider_chain() {
        let base: Arc<dyn Protocol> = RpcProtocol::new();
        let loader = Arc::new(rpc_filter::default_loader());
        let wrapped = ProtocolFilterWrapper::new(base, loader);

        let url = Url::new("rpc", "127.0.0.1", 0)
            .with_path("com.example.Echo")
            .add_parameter("executes", "10");
        let exporter = wrapped.export(Arc::new(Echo { url })).await.unwrap();
        exporter.unexport();
    }
}
