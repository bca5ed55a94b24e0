use {rpc_core::ErrorKind, thiserror::Error};

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("request {0} timed out waiting for a response")]
    Timeout(u64),
    #[error("request {0} was cancelled")]
    Cancelled(u64),
    #[error("transport error: {0}")]
    Transport(#[from] rpc_transport::TransportError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("channel is not connected")]
    NotConnected,
}

impl rpc_core::HasKind for ExchangeError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Cancelled(_) => ErrorKind::Network,
            Self::Transport(_) | Self::NotConnected => ErrorKind::Network,
            Self::Serialization(_) => ErrorKind::Serialization,
        }
    }
}
