use {rpc_core::ErrorKind, thiserror::Error};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry backend unreachable: {0}")]
    Unreachable(String),
    #[error("registry backend rejected the request: {0}")]
    Backend(String),
    #[error("io error writing local cache: {0}")]
    Cache(#[from] std::io::Error),
    #[error("no cached state for subscribe key {0:?}")]
    NoCache(String),
}

impl RegistryError {
    /// Registry errors are never surfaced directly to an invocation (§7):
    /// callers that need a cross-crate kind map every variant to
    /// `Forbidden`, since the only observable effect on the invocation
    /// path is "no provider available".
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Forbidden
    }
}
