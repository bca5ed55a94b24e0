use {crate::invocation::Attachments, crate::error::RpcError};

/// The outcome of an invocation: exactly one of `value`/`exception` is set,
/// enforced by construction rather than by convention.
#[derive(Debug, Clone)]
pub enum RpcResult {
    Value {
        value: serde_json::Value,
        attachments: Attachments,
    },
    Exception {
        error: std::sync::Arc<RpcError>,
        attachments: Attachments,
    },
}

impl RpcResult {
    pub fn value(value: serde_json::Value) -> Self {
        Self::Value {
            value,
            attachments: Attachments::new(),
        }
    }

    pub fn exception(error: RpcError) -> Self {
        Self::Exception {
            error: std::sync::Arc::new(error),
            attachments: Attachments::new(),
        }
    }

    pub fn is_exception(&self) -> bool {
        matches!(self, Self::Exception { .. })
    }

    pub fn attachments(&self) -> &Attachments {
        match self {
            Self::Value { attachments, .. } => attachments,
            Self::Exception { attachments, .. } => attachments,
        }
    }

    pub fn attachments_mut(&mut self) -> &mut Attachments {
        match self {
            Self::Value { attachments, .. } => attachments,
            Self::Exception { attachments, .. } => attachments,
        }
    }

    /// Unwraps into a plain `std::result::Result`, the shape filters and
    /// proxies actually want to branch on.
    pub fn into_std(self) -> Result<serde_json::Value, RpcError> {
        match self {
            Self::Value { value, .. } => Ok(value),
            Self::Exception { error, .. } => Err(
                std::sync::Arc::try_unwrap(error).unwrap_or_else(|e| RpcError::Unknown(e.to_string())),
            ),
        }
    }
}

impl From<Result<serde_json::Value, RpcError>> for RpcResult {
    fn from(r: Result<serde_json::Value, RpcError>) -> Self {
        match r {
            Ok(v) => Self::value(v),
            Err(e) => Self::exception(e),
        }
    }
}
