//! Process-wide shutdown hook (§4.9): a singleton that remembers every
//! exporter and reference invoker the orchestrator has produced and, once,
//! tears all of it down — unexporting (which itself unregisters from the
//! registry before releasing the transport binding, see
//! `rpc_protocol::registry_protocol::RegistryExporter`) everything still
//! exported, then destroying every reference invoker still held (which
//! unsubscribes and disconnects). Firing twice is a no-op: the compare-
//! exchange on `fired` only lets the first caller through.

use {
    rpc_core::{BoxExporter, BoxInvoker},
    std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, OnceLock,
    },
};

pub struct ShutdownHook {
    exporters: Mutex<Vec<BoxExporter>>,
    invokers: Mutex<Vec<BoxInvoker>>,
    fired: AtomicBool,
}

static GLOBAL: OnceLock<Arc<ShutdownHook>> = OnceLock::new();

impl ShutdownHook {
    fn new() -> Self {
        Self {
            exporters: Mutex::new(Vec::new()),
            invokers: Mutex::new(Vec::new()),
            fired: AtomicBool::new(false),
        }
    }

    /// The process-wide instance, created on first access.
    pub fn global() -> Arc<ShutdownHook> {
        GLOBAL.get_or_init(|| Arc::new(ShutdownHook::new())).clone()
    }

    pub fn register_exporter(&self, exporter: BoxExporter) {
        self.exporters.lock().unwrap().push(exporter);
    }

    pub fn register_invoker(&self, invoker: BoxInvoker) {
        self.invokers.lock().unwrap().push(invoker);
    }

    /// Unexports everything exported, then destroys everything referenced.
    /// Safe to call from multiple tasks concurrently or multiple times;
    /// only the first call does any work.
    pub fn fire(&self) {
        if self.fired.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return;
        }
        tracing::info!("shutdown hook firing: unexporting services, destroying references");
        for exporter in self.exporters.lock().unwrap().drain(..) {
            exporter.unexport();
        }
        for invoker in self.invokers.lock().unwrap().drain(..) {
            invoker.destroy();
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

/// Waits for SIGTERM/SIGINT (or just ctrl-c on non-Unix), grounded in the
/// same signal-handling idiom used by this workspace's service binaries.
pub async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT, shutting down"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("failed to install CTRL+C handler");
        tracing::info!("received CTRL+C, shutting down");
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        async_trait::async_trait,
        rpc_core::{Invocation, Invoker, RpcResult},
        rpc_url::Url,
        std::sync::atomic::{AtomicUsize, Ordering as O},
    };

    struct CountingExporter(Arc<AtomicUsize>);
    impl rpc_core::Exporter for CountingExporter {
        fn url(&self) -> &Url {
            static URL: std::sync::OnceLock<Url> = std::sync::OnceLock::new();
            URL.get_or_init(|| Url::new("rpc", "h", 1))
        }
        fn unexport(&self) {
            self.0.fetch_add(1, O::SeqCst);
        }
    }

    struct CountingInvoker(Arc<AtomicUsize>);
    #[async_trait]
    impl Invoker for CountingInvoker {
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
        async fn invoke(&self, _invocation: Invocation) -> RpcResult {
            RpcResult::value(serde_json::Value::Null)
        }
        fn destroy(&self) {
            self.0.fetch_add(1, O::SeqCst);
        }
    }

    #[test]
    fn fire_is_idempotent_and_tears_down_everything_registered() {
        let hook = ShutdownHook::new();
        let unexports = Arc::new(AtomicUsize::new(0));
        let destroys = Arc::new(AtomicUsize::new(0));
        hook.register_exporter(Arc::new(CountingExporter(unexports.clone())));
        hook.register_invoker(Arc::new(CountingInvoker(destroys.clone())));

        hook.fire();
        hook.fire();

        assert_eq!(unexports.load(O::SeqCst), 1);
        assert_eq!(destroys.load(O::SeqCst), 1);
        assert!(hook.has_fired());
    }

    #[test]
    fn global_returns_the_same_instance() {
        let a = ShutdownHook::global();
        let b = ShutdownHook::global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
