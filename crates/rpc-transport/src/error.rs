use {
    rpc_core::ErrorKind,
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] crate::codec::CodecError),
    #[error("worker pool rejected task: {0}")]
    LimitExceeded(String),
}

impl rpc_core::HasKind for TransportError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Closed | Self::Io(_) => ErrorKind::Network,
            Self::Codec(_) => ErrorKind::Serialization,
            Self::LimitExceeded(_) => ErrorKind::LimitExceeded,
        }
    }
}
