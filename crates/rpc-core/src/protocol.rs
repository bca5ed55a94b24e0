//! The seam between the invocation pipeline and whatever binds/connects a
//! service to the network (§4.5, C6). Defined here rather than in
//! `rpc-protocol` so that `rpc-cluster`'s `RegistryDirectory` can refer
//! provider URLs into invokers without depending on the crate that wraps
//! `RegistryDirectory` into a cluster invoker in the first place.

use {crate::invoker::BoxInvoker, rpc_url::Url, std::sync::Arc};

/// A lifetime handle for an exported service (§3 `Exporter`). Dropping it
/// does not unexport; call [`Exporter::unexport`] for that, which must be
/// idempotent.
pub trait Exporter: Send + Sync {
    fn url(&self) -> &Url;
    fn unexport(&self);
}

pub type BoxExporter = Arc<dyn Exporter>;

/// `export`/`refer` (§4.5): binds a local invoker to a transport server, or
/// creates a remote invoker for a URL. Implemented by the concrete
/// transport-backed protocol (`rpc-protocol`) and by the `registry`
/// meta-protocol that wraps it with discovery.
#[async_trait::async_trait]
pub trait Protocol: Send + Sync {
    async fn export(&self, invoker: BoxInvoker) -> Result<BoxExporter, crate::error::RpcError>;

    async fn refer(&self, interface: &str, url: Url) -> Result<BoxInvoker, crate::error::RpcError>;
}

pub type BoxProtocol = Arc<dyn Protocol>;
