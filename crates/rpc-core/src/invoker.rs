use {crate::invocation::Invocation, crate::result::RpcResult, rpc_url::Url, std::sync::Arc};

/// A callable endpoint, local or remote (§3). Created by `protocol.refer`
/// or `protocol.export`; destroyed by its creator. Every wrapper (filter,
/// cluster, listener) forwards `destroy` to the invoker it wraps, so destroy
/// cascades from the outermost wrapper down to the transport connection.
#[async_trait::async_trait]
pub trait Invoker: Send + Sync {
    /// The service interface this invoker answers for, e.g.
    /// `"com.example.Hello"` or a local crate's fully qualified type name.
    fn interface(&self) -> &str;

    fn url(&self) -> &Url;

    /// Best-effort liveness: false once known-disconnected or destroyed.
    /// Never blocks.
    fn is_available(&self) -> bool;

    async fn invoke(&self, invocation: Invocation) -> RpcResult;

    /// Idempotent: a second call is a no-op. After destroy, `invoke` must
    /// return a permanent `RpcError::Network` or `RpcError::Forbidden`.
    fn destroy(&self);
}

pub type BoxInvoker = Arc<dyn Invoker>;
