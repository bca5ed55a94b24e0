use {rpc_core::ErrorKind, thiserror::Error};

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("no invoker available for {0:?}")]
    NoInvokerAvailable(String),
    #[error("all candidates failed for {method:?}: {last}")]
    AllFailed {
        method: String,
        #[source]
        last: rpc_core::RpcError,
    },
}

impl rpc_core::HasKind for ClusterError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NoInvokerAvailable(_) => ErrorKind::Forbidden,
            Self::AllFailed { last, .. } => last.kind(),
        }
    }
}

impl From<ClusterError> for rpc_core::RpcError {
    fn from(err: ClusterError) -> Self {
        match &err {
            ClusterError::NoInvokerAvailable(msg) => rpc_core::RpcError::forbidden(msg.clone()),
            ClusterError::AllFailed { method, last } => {
                rpc_core::RpcError::Unknown(format!("{method}: {last}"))
            }
        }
    }
}
