//! Errors surfaced by the export/reference pipelines (§4.9, C11).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("service descriptor for {interface:?} declares no protocols to export on")]
    NoProtocols { interface: String },

    #[error("reference descriptor for {interface:?} declares no registries to subscribe to")]
    NoRegistries { interface: String },

    #[error(transparent)]
    Config(#[from] rpc_config::ConfigError),

    #[error(transparent)]
    Registry(#[from] rpc_registry::RegistryError),

    #[error(transparent)]
    Rpc(#[from] rpc_core::RpcError),
}
