use {rpc_core::ErrorKind, thiserror::Error};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("exchange error: {0}")]
    Exchange(#[from] rpc_exchange::ExchangeError),
    #[error("registry error: {0}")]
    Registry(#[from] rpc_registry::RegistryError),
    #[error("extension error: {0}")]
    Extension(#[from] rpc_extension::ExtensionError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}

impl rpc_core::HasKind for ProtocolError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Exchange(err) => rpc_core::HasKind::kind(err),
            Self::Registry(_) => ErrorKind::Forbidden,
            Self::Extension(_) => ErrorKind::Unknown,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Other(_) => ErrorKind::Unknown,
        }
    }
}

impl From<ProtocolError> for rpc_core::RpcError {
    fn from(err: ProtocolError) -> Self {
        use rpc_core::HasKind;
        let kind = err.kind();
        let message = err.to_string();
        match kind {
            ErrorKind::Timeout => rpc_core::RpcError::Timeout(message),
            ErrorKind::Network => rpc_core::RpcError::Network(message),
            ErrorKind::Serialization => rpc_core::RpcError::Serialization(message),
            ErrorKind::Biz => rpc_core::RpcError::Biz(serde_json::json!(message)),
            ErrorKind::Forbidden => rpc_core::RpcError::Forbidden(message),
            ErrorKind::LimitExceeded => rpc_core::RpcError::LimitExceeded(message),
            ErrorKind::Unknown => rpc_core::RpcError::Unknown(message),
        }
    }
}
