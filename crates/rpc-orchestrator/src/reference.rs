//! Reference pipeline (§4.9, symmetric to [`crate::export`]): for a
//! [`ReferenceDescriptor`], build the `consumer://` URL a
//! [`rpc_cluster::RegistryDirectory`] subscribes against, wrap the shared
//! transport protocol in a [`RegistryProtocol`] per named registry, and
//! hand back the resulting cluster invoker. Producing the typed proxy on
//! top (a [`rpc_proxy::ServiceStub`] or a raw [`rpc_proxy::GenericInvoker`])
//! is left to the caller, which is the one that knows the interface's
//! concrete stub type.

use {
    crate::{error::OrchestratorError, Orchestrator},
    rpc_config::ReferenceDescriptor,
    rpc_core::BoxInvoker,
    rpc_protocol::registry_protocol::RegistryProtocol,
    rpc_url::Url,
};

impl Orchestrator {
    /// Builds a consumer-side invoker for `descriptor` (§4.9 reference
    /// pipeline): one [`RegistryDirectory`](rpc_cluster::RegistryDirectory)
    /// per declared registry, each wrapped in its own cluster invoker; when
    /// more than one registry is declared, the last one reachable wins,
    /// mirroring the "same URL different parameters coexist as distinct
    /// keys" binding decision in that there is no attempt to merge the
    /// resulting provider sets across registries.
    pub async fn refer(&self, descriptor: &ReferenceDescriptor) -> Result<BoxInvoker, OrchestratorError> {
        if descriptor.registries.is_empty() {
            return Err(OrchestratorError::NoRegistries {
                interface: descriptor.interface.clone(),
            });
        }

        let consumer_url = build_consumer_url(descriptor);

        let mut invoker = None;
        for registry_url in &descriptor.registries {
            let registry_client = self.registries.client_for(registry_url);
            let registry_protocol = RegistryProtocol::new(registry_client, self.transport.clone());
            invoker = Some(
                registry_protocol
                    .refer(&descriptor.interface, consumer_url.clone())
                    .await
                    .map_err(OrchestratorError::from)?,
            );
        }
        let invoker = invoker.expect("non-empty registries checked above");

        self.shutdown.register_invoker(invoker.clone());
        Ok(invoker)
    }
}

/// The `consumer://` URL a `RegistryDirectory` subscribes against (§4.6):
/// carries every parameter the directory, router, and load balancer need
/// to resolve — group/version select the service key, the rest tune
/// selection/failure policy for the cluster invoker built on top.
fn build_consumer_url(descriptor: &ReferenceDescriptor) -> Url {
    let mut url = Url::new("consumer", "0.0.0.0", 0)
        .with_path(descriptor.interface.clone())
        .add_parameter("timeout", descriptor.timeout.as_millis().to_string())
        .add_parameter("retries", descriptor.retries.to_string())
        .add_parameter("loadbalance", descriptor.load_balance.clone())
        .add_parameter("cluster", descriptor.cluster.clone())
        .add_parameter("check", descriptor.check.to_string())
        .add_parameter("generic", descriptor.generic.to_string());

    if let Some(group) = &descriptor.group {
        url = url.add_parameter("group", group.clone());
    }
    if let Some(version) = &descriptor.version {
        url = url.add_parameter("version", version.clone());
    }

    url
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::Orchestrator,
        rpc_config::ServiceDescriptor,
        rpc_core::BoxInvoker,
        rpc_proxy::Dispatcher,
        std::sync::Arc,
    };

    fn dispatcher_invoker() -> BoxInvoker {
        let dispatcher = Arc::new(Dispatcher::new("com.example.Hello", Url::new("rpc", "127.0.0.1", 0)));
        dispatcher.register(
            "greet",
            Box::new(|invocation| {
                Box::pin(async move {
                    let name = invocation.arguments().first().cloned().unwrap_or_default();
                    rpc_core::RpcResult::value(serde_json::json!(format!("hello {}", name.as_str().unwrap_or(""))))
                })
            }),
        );
        dispatcher
    }

    #[tokio::test]
    async fn export_then_refer_through_a_shared_memory_registry() {
        let orchestrator = Orchestrator::new();
        let registry_url = Url::new("memory", "export-then-refer", 1).with_path("com.example.Hello");

        let export = orchestrator
            .export(
                &ServiceDescriptor::new("com.example.Hello")
                    .with_method("greet")
                    .with_protocol(rpc_config::ProtocolConfig {
                        name: "rpc".into(),
                        host: Some("127.0.0.1".into()),
                        port: Some(0),
                        ..rpc_config::ProtocolConfig::default()
                    })
                    .with_registry(registry_url.clone()),
                dispatcher_invoker(),
            )
            .await
            .unwrap();

        let invoker = orchestrator
            .refer(&ReferenceDescriptor::new("com.example.Hello").with_registry(registry_url))
            .await
            .unwrap();

        let result = invoker
            .invoke(rpc_core::Invocation::new("greet", vec!["String".into()], vec![serde_json::json!("x")]))
            .await;
        assert_eq!(result.into_std().unwrap(), serde_json::json!("hello x"));

        invoker.destroy();
        export.unexport_all();
    }

    #[tokio::test]
    async fn referring_without_any_registry_is_an_error() {
        let orchestrator = Orchestrator::new();
        let err = orchestrator
            .refer(&ReferenceDescriptor::new("com.example.Hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NoRegistries { .. }));
    }
}
