//! Service export pipeline (§4.9 step (a)-(e)): for every (protocol,
//! registry) pair declared on a [`ServiceDescriptor`], resolve the bind and
//! registry-advertised host/port, build the provider URL, bind the local
//! invoker through it, register the advertised URL, and hand back an
//! [`Exporter`] per pair. Every exporter produced is also handed to the
//! process-wide [`ShutdownHook`] so a missed `unexport` call still gets torn
//! down on shutdown.

use {
    crate::{error::OrchestratorError, shutdown::ShutdownHook, url_bound_invoker::UrlBoundInvoker, Orchestrator},
    rpc_config::ServiceDescriptor,
    rpc_core::{BoxExporter, BoxInvoker, Exporter},
    rpc_registry::RegistryClient,
    rpc_url::Url,
    std::sync::Arc,
};

/// The conventional default port for a protocol name not otherwise
/// configured (§6 `[[protocols]]`); `rpc` matches the wire protocol's own
/// convention in `rpc-exchange`/`rpc-protocol`.
fn default_port_for(protocol: &str) -> u16 {
    match protocol {
        "rest" | "http" => 8080,
        _ => 20880,
    }
}

/// Every exporter a single [`Orchestrator::export`] call produced — one per
/// (protocol, registry) pair, or one per protocol if the service declares
/// no registries at all (local-only export).
pub struct ServiceExport {
    exporters: Vec<BoxExporter>,
}

impl ServiceExport {
    pub fn exporters(&self) -> &[BoxExporter] {
        &self.exporters
    }

    pub fn unexport_all(&self) {
        for exporter in &self.exporters {
            exporter.unexport();
        }
    }
}

/// Wraps a transport-level exporter with registry registration under a
/// possibly different (NAT-advertised) URL, mirroring
/// `rpc_protocol::registry_protocol::RegistryExporter` but letting bind and
/// advertise host/port diverge (§4.9's priority chain can resolve them to
/// different addresses; `rpc_protocol::RegistryProtocol` assumes they're
/// the same one).
struct RegistryBackedExporter {
    local: BoxExporter,
    registry: Arc<RegistryClient>,
    advertise_url: Url,
}

impl Exporter for RegistryBackedExporter {
    fn url(&self) -> &Url {
        &self.advertise_url
    }

    fn unexport(&self) {
        self.local.unexport();
        let registry = self.registry.clone();
        let advertise_url = self.advertise_url.clone();
        tokio::spawn(async move {
            if let Err(err) = registry.unregister(&advertise_url).await {
                tracing::warn!(url = %advertise_url, %err, "failed to unregister provider");
            }
        });
    }
}

impl Orchestrator {
    /// Exports `invoker` per `descriptor` (§4.9). `invoker` should already
    /// carry the service's own logic (a [`rpc_proxy::Dispatcher`] wired up
    /// by the service crate, or a [`rpc_proxy::GenericInvoker`]-style
    /// wrapper); this pipeline only concerns itself with addressing and
    /// registration, never with method dispatch.
    pub async fn export(
        &self,
        descriptor: &ServiceDescriptor,
        invoker: BoxInvoker,
    ) -> Result<ServiceExport, OrchestratorError> {
        descriptor.validate()?;
        if descriptor.protocols.is_empty() {
            return Err(OrchestratorError::NoProtocols {
                interface: descriptor.interface.clone(),
            });
        }
        if invoker.interface() != descriptor.interface {
            tracing::warn!(
                invoker_interface = invoker.interface(),
                descriptor_interface = %descriptor.interface,
                "exported invoker's interface does not match its service descriptor"
            );
        }

        let mut exporters = Vec::new();

        for protocol_cfg in &descriptor.protocols {
            let bind_host = rpc_config::env::resolve_bind_host(&protocol_cfg.name, protocol_cfg.host.as_deref());
            let default_port = default_port_for(&protocol_cfg.name);
            let bind_port = rpc_config::env::resolve_bind_port(&protocol_cfg.name, protocol_cfg.port, default_port);

            let bind_url = build_provider_url(descriptor, protocol_cfg, &bind_host, bind_port);

            let bound_invoker = UrlBoundInvoker::new(invoker.clone(), bind_url.clone());
            let local_exporter = self.transport.export(bound_invoker).await.map_err(OrchestratorError::from)?;

            if descriptor.registries.is_empty() {
                register_with_hook(&self.shutdown, local_exporter.clone());
                exporters.push(local_exporter);
                continue;
            }

            for registry_url in &descriptor.registries {
                let registry_host = rpc_config::env::resolve_registry_host(&protocol_cfg.name, &bind_host);
                let registry_port = rpc_config::env::resolve_registry_port(&protocol_cfg.name, bind_port);
                let advertise_url = bind_url.clone().with_host(registry_host).with_port(registry_port);

                let registry_client = self.registries.client_for(registry_url);
                registry_client.register(advertise_url.clone()).await?;

                let exporter: BoxExporter = Arc::new(RegistryBackedExporter {
                    local: local_exporter.clone(),
                    registry: registry_client,
                    advertise_url,
                });
                register_with_hook(&self.shutdown, exporter.clone());
                exporters.push(exporter);
            }
        }

        Ok(ServiceExport { exporters })
    }
}

fn register_with_hook(hook: &Arc<ShutdownHook>, exporter: BoxExporter) {
    hook.register_exporter(exporter);
}

/// Builds the provider URL carrying every parameter a consumer-side
/// `RegistryDirectory`/`ClusterInvoker`/filter chain needs to see (§3, §3.1,
/// §4.6, §4.7): group/version/timeout/retries/loadbalance/cluster plus one
/// `methods.<name>.*` parameter per overridden field (§3.1).
fn build_provider_url(
    descriptor: &ServiceDescriptor,
    protocol_cfg: &rpc_config::ProtocolConfig,
    bind_host: &str,
    bind_port: u16,
) -> Url {
    let mut url = Url::new(protocol_cfg.name.clone(), bind_host.to_string(), bind_port)
        .with_path(descriptor.interface.clone())
        .add_parameter("timeout", descriptor.timeout.as_millis().to_string())
        .add_parameter("retries", descriptor.retries.to_string())
        .add_parameter("loadbalance", descriptor.load_balance.clone())
        .add_parameter("cluster", descriptor.cluster.clone())
        .add_parameter("serialization", protocol_cfg.serialization.clone());

    if let Some(group) = &descriptor.group {
        url = url.add_parameter("group", group.clone());
    }
    if let Some(version) = &descriptor.version {
        url = url.add_parameter("version", version.clone());
    }

    for method in &descriptor.methods {
        let Some(over) = descriptor.method_overrides.get(method) else {
            continue;
        };
        if let Some(retries) = over.retries {
            url = url.add_parameter(format!("methods.{method}.retries"), retries.to_string());
        }
        if let Some(timeout) = over.timeout {
            url = url.add_parameter(format!("methods.{method}.timeout"), timeout.as_millis().to_string());
        }
        if over.oneway {
            url = url.add_parameter(format!("methods.{method}.oneway"), "true");
        }
        if over.is_async {
            url = url.add_parameter(format!("methods.{method}.async"), "true");
        }
    }

    url
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        async_trait::async_trait,
        rpc_config::ProtocolConfig,
        rpc_core::{Invocation, Invoker, RpcResult},
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

    fn descriptor(registries: Vec<Url>) -> ServiceDescriptor {
        ServiceDescriptor::new("com.example.Echo")
            .with_method("echo")
            .with_protocol(ProtocolConfig {
                name: "rpc".into(),
                host: Some("127.0.0.1".into()),
                port: Some(0),
                ..ProtocolConfig::default()
            })
            .with_registry_urls(registries)
    }

    trait WithRegistryUrls {
        fn with_registry_urls(self, urls: Vec<Url>) -> Self;
    }
    impl WithRegistryUrls for ServiceDescriptor {
        fn with_registry_urls(mut self, urls: Vec<Url>) -> Self {
            self.registries = urls;
            self
        }
    }

    #[tokio::test]
    async fn export_without_registries_binds_locally_only() {
        let orchestrator = Orchestrator::new();
        let invoker: BoxInvoker = Arc::new(Echo {
            url: Url::new("rpc", "127.0.0.1", 0).with_path("com.example.Echo"),
        });

        let export = orchestrator.export(&descriptor(vec![]), invoker).await.unwrap();
        assert_eq!(export.exporters().len(), 1);
        export.unexport_all();
    }

    #[tokio::test]
    async fn export_with_a_registry_registers_the_advertised_url() {
        let orchestrator = Orchestrator::new();
        let invoker: BoxInvoker = Arc::new(Echo {
            url: Url::new("rpc", "127.0.0.1", 0).with_path("com.example.Echo"),
        });
        let registry_url = Url::new("memory", "test-registry", 1).with_path("com.example.Echo");

        let export = orchestrator
            .export(&descriptor(vec![registry_url.clone()]), invoker)
            .await
            .unwrap();
        assert_eq!(export.exporters().len(), 1);

        let client = orchestrator.registries.client_for(&registry_url);
        let providers = client.lookup(&registry_url).await.unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].interface(), Some("com.example.Echo"));

        export.unexport_all();
    }

    #[tokio::test]
    async fn exporting_without_any_protocol_is_an_error() {
        let orchestrator = Orchestrator::new();
        let invoker: BoxInvoker = Arc::new(Echo {
            url: Url::new("rpc", "127.0.0.1", 0).with_path("com.example.Echo"),
        });
        let descriptor = ServiceDescriptor::new("com.example.Echo").with_method("echo");
        let err = orchestrator.export(&descriptor, invoker).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NoProtocols { .. }));
    }
}
