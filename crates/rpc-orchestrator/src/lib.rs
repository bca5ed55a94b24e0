//! Service/Reference lifecycle (§4.9, C11): turns a [`ServiceDescriptor`]
//! or [`ReferenceDescriptor`] into exported/referenced invokers by driving
//! the protocol/registry/filter machinery the lower layers provide. An
//! [`Orchestrator`] owns the process-wide pieces a service binary needs
//! exactly one of: the transport-backed [`Protocol`](rpc_core::Protocol)
//! (already wrapped in the provider/consumer filter chain), a cache of
//! [`RegistryClient`](rpc_registry::RegistryClient)s keyed by address, and
//! the [`ShutdownHook`].

pub mod defaults;
pub mod error;
mod export;
mod reference;
mod registries;
mod shutdown;
mod url_bound_invoker;

pub use {
    defaults::OrchestratorDefaults,
    error::OrchestratorError,
    export::ServiceExport,
    registries::RegistryFactory,
    shutdown::{wait_for_shutdown_signal, ShutdownHook},
};

use {
    rpc_core::Protocol,
    rpc_extension::ExtensionLoader,
    rpc_filter::Filter,
    rpc_protocol::{exporter::RpcProtocol, wrapper::ProtocolFilterWrapper},
    std::sync::Arc,
};

/// The process-wide entry point for the export and reference pipelines
/// (§4.9). One instance is enough for an entire process: it pools transport
/// connections/servers (inside the wrapped [`RpcProtocol`]) and registry
/// clients (one per distinct address) across every service/reference it
/// handles, and feeds every exporter/invoker it produces to the shared
/// [`ShutdownHook`] so a process-wide shutdown tears all of it down even if
/// a caller never explicitly unexports or destroys.
pub struct Orchestrator {
    transport: Arc<dyn Protocol>,
    registries: RegistryFactory,
    shutdown: Arc<ShutdownHook>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::with_filter_loader(Arc::new(rpc_filter::default_loader()))
    }

    /// Builds an orchestrator whose provider/consumer filter chains are
    /// drawn from `loader` instead of [`rpc_filter::default_loader`] — used
    /// by tests and by services that register additional `@Activate`
    /// filters before wiring the orchestrator.
    pub fn with_filter_loader(loader: Arc<ExtensionLoader<dyn Filter>>) -> Self {
        let base: Arc<dyn Protocol> = RpcProtocol::new();
        Self {
            transport: ProtocolFilterWrapper::new(base, loader),
            registries: RegistryFactory::new(),
            shutdown: ShutdownHook::global(),
        }
    }

    pub fn registries(&self) -> &RegistryFactory {
        &self.registries
    }

    pub fn shutdown_hook(&self) -> &Arc<ShutdownHook> {
        &self.shutdown
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}
