//! The base transport-backed [`rpc_core::Protocol`] (§4.5, C6): `export`
//! binds (or reuses) an [`ExchangeServer`] on the invoker's address and
//! registers it in that address's [`ServiceRequestHandler`]; `refer`
//! connects (or reuses) an [`ExchangeClient`] and wraps it in a
//! [`RemoteInvoker`]. Connection pooling is per-address, matching §4.3's
//! "one connection per provider address, shared across every reference to
//! it" contract.
//!
//! This is the innermost layer in the wrapper stack (§4.5): `RegistryProtocol`
//! and `ProtocolFilterWrapper`/`ProtocolListenerWrapper` decorate an
//! `Arc<dyn Protocol>` built from this type, never the other way around.

use {
    crate::{error::ProtocolError, remote_invoker::RemoteInvoker, service_registry::ServiceRequestHandler},
    async_trait::async_trait,
    rpc_core::{BoxExporter, BoxInvoker, Exporter, Protocol, RpcError},
    rpc_exchange::{ExchangeClient, ExchangeServer, DEFAULT_HEARTBEAT},
    rpc_url::Url,
    std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    },
    tokio::sync::Mutex as AsyncMutex,
};

const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(180);

struct BoundServer {
    server: Arc<ExchangeServer>,
    handler: Arc<ServiceRequestHandler>,
    exported: AtomicUsize,
}

pub struct RpcProtocol {
    servers: dashmap::DashMap<String, Arc<BoundServer>>,
    bind_locks: dashmap::DashMap<String, Arc<AsyncMutex<()>>>,
    clients: dashmap::DashMap<String, Arc<ExchangeClient>>,
    connect_locks: dashmap::DashMap<String, Arc<AsyncMutex<()>>>,
    metrics: Option<Arc<rpc_observe::Metrics>>,
}

impl RpcProtocol {
    pub fn new() -> Arc<Self> {
        Self::with_metrics(None)
    }

    pub fn with_metrics(metrics: Option<Arc<rpc_observe::Metrics>>) -> Arc<Self> {
        Arc::new(Self {
            servers: dashmap::DashMap::new(),
            bind_locks: dashmap::DashMap::new(),
            clients: dashmap::DashMap::new(),
            connect_locks: dashmap::DashMap::new(),
            metrics,
        })
    }

    async fn ensure_server(&self, url: &Url) -> Result<Arc<BoundServer>, ProtocolError> {
        let address = url.address();
        if let Some(existing) = self.servers.get(&address) {
            return Ok(existing.clone());
        }

        let lock = self
            .bind_locks
            .entry(address.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Some(existing) = self.servers.get(&address) {
            return Ok(existing.clone());
        }

        let handler = Arc::new(ServiceRequestHandler::new());
        let server = ExchangeServer::bind(url.clone(), handler.clone(), DEFAULT_IDLE_TIMEOUT).await?;
        let bound = Arc::new(BoundServer {
            server,
            handler,
            exported: AtomicUsize::new(0),
        });
        self.servers.insert(address, bound.clone());
        Ok(bound)
    }

    async fn ensure_client(&self, url: &Url) -> Result<Arc<ExchangeClient>, ProtocolError> {
        let address = url.address();
        if let Some(existing) = self.clients.get(&address) {
            if existing.is_connected() {
                return Ok(existing.clone());
            }
        }

        let lock = self
            .connect_locks
            .entry(address.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Some(existing) = self.clients.get(&address) {
            if existing.is_connected() {
                return Ok(existing.clone());
            }
        }

        let heartbeat = Duration::from_millis(url.parameter_u64("heartbeat", DEFAULT_HEARTBEAT.as_millis() as u64));
        let client = ExchangeClient::connect_with_metrics(url.clone(), heartbeat, self.metrics.clone()).await?;
        self.clients.insert(address, client.clone());
        Ok(client)
    }
}

#[async_trait]
impl Protocol for RpcProtocol {
    async fn export(&self, invoker: BoxInvoker) -> Result<BoxExporter, RpcError> {
        let url = invoker.url().clone();
        let bound = self.ensure_server(&url).await?;
        let service_key = url.service_key().to_string();
        bound.handler.register(service_key.clone(), invoker);
        bound.exported.fetch_add(1, Ordering::SeqCst);

        Ok(Arc::new(RpcExporter {
            url,
            service_key,
            bound,
        }))
    }

    async fn refer(&self, interface: &str, url: Url) -> Result<BoxInvoker, RpcError> {
        let client = self.ensure_client(&url).await?;
        Ok(RemoteInvoker::new(interface.to_string(), url, client))
    }
}

pub struct RpcExporter {
    url: Url,
    service_key: String,
    bound: Arc<BoundServer>,
}

impl Exporter for RpcExporter {
    fn url(&self) -> &Url {
        &self.url
    }

    fn unexport(&self) {
        // Idempotent: `fetch_update` only succeeds (and only unregisters)
        // the first time the count would go from >0 to 0-or-more; a second
        // call sees the registration already gone and no-ops.
        if self.bound.handler.unregister_if_present(&self.service_key) {
            self.bound.exported.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rpc_core::Invoker, rpc_core::Invocation, rpc_core::RpcResult};

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
    async fn export_then_refer_round_trips_a_call() {
        let protocol = RpcProtocol::new();
        let provider_url = Url::new("rpc", "127.0.0.1", 0).with_path("com.example.Echo");
        let invoker: BoxInvoker = Arc::new(Echo { url: provider_url.clone() });

        let exporter = protocol.export(invoker).await.unwrap();
        let bound_port = {
            let bound = protocol.servers.get(&provider_url.address()).map(|e| e.clone());
            bound.unwrap().server.local_url().port().unwrap()
        };
        let reachable = Url::new("rpc", "127.0.0.1", bound_port).with_path("com.example.Echo");

        let client_invoker = protocol.refer("com.example.Echo", reachable).await.unwrap();
        let result = client_invoker
            .invoke(Invocation::new("echo", vec![], vec![serde_json::json!("hi")]))
            .await;
        assert_eq!(result.into_std().unwrap(), serde_json::json!("hi"));

        exporter.unexport();
        exporter.unexport(); // idempotent
    }
}
