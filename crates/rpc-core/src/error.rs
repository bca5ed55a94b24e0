use thiserror::Error;

/// The stable, cross-crate error currency (§7). Every crate-local error type
/// implements [`HasKind`] so that cluster policies and filters can match on
/// kind without depending on every crate's concrete error enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Timeout,
    Network,
    Serialization,
    Biz,
    Unknown,
    Forbidden,
    LimitExceeded,
}

/// A generic RPC error carrying a stable kind, a message, and (for `Biz`) the
/// opaque remote payload. This is the type that crosses the proxy boundary
/// back to caller code.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("remote exception: {0}")]
    Biz(serde_json::Value),
    #[error("unknown server error: {0}")]
    Unknown(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),
}

impl RpcError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Network(_) => ErrorKind::Network,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Biz(_) => ErrorKind::Biz,
            Self::Unknown(_) => ErrorKind::Unknown,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::LimitExceeded(_) => ErrorKind::LimitExceeded,
        }
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }
}

/// Implemented by every crate-local error enum so it can be folded into
/// [`ErrorKind`] without a conversion table living in each call site.
pub trait HasKind {
    fn kind(&self) -> ErrorKind;
}

impl HasKind for RpcError {
    fn kind(&self) -> ErrorKind {
        RpcError::kind(self)
    }
}
