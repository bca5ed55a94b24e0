//! Client-side invoker (§4.5, C6): serializes an [`rpc_core::Invocation`]
//! into a [`RequestBody`], sends it over a shared [`ExchangeClient`]
//! connection, and translates the correlated [`ExchangeResponse`] (or a
//! oneway fire-and-forget send) back into an [`rpc_core::RpcResult`].

use {
    crate::error::ProtocolError,
    rpc_core::{Invocation, Invoker, RpcError, RpcResult},
    rpc_exchange::{ExchangeClient, ExchangeResponse, RequestBody, ResponseBody},
    rpc_transport::Status,
    rpc_url::Url,
    std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        time::Duration,
    },
};

const RPC_VERSION: &str = "1.0";
const DEFAULT_TIMEOUT_MS: u64 = 5_000;

pub struct RemoteInvoker {
    interface: String,
    url: Url,
    exchange: Arc<ExchangeClient>,
    destroyed: AtomicBool,
}

impl RemoteInvoker {
    pub fn new(interface: String, url: Url, exchange: Arc<ExchangeClient>) -> Arc<Self> {
        Arc::new(Self {
            interface,
            url,
            exchange,
            destroyed: AtomicBool::new(false),
        })
    }

    /// Per-method oneway policy is carried on the provider/consumer URL as
    /// `methods.<name>.oneway=true`, the same place the orchestrator (C11)
    /// folds every other `MethodConfig` override into the URL that ends up
    /// here (§3.1, §4.9).
    fn is_oneway(&self, method: &str) -> bool {
        self.url.parameter_bool(&format!("methods.{method}.oneway"), false)
    }

    fn request_body(&self, invocation: &Invocation) -> RequestBody {
        let mut attachments = invocation.attachments().clone();
        if let Some(group) = self.url.group() {
            attachments.entry("group".to_string()).or_insert_with(|| group.to_string());
        }
        RequestBody {
            rpc_version: RPC_VERSION.to_string(),
            service_path: self.url.interface().unwrap_or(&self.interface).to_string(),
            service_version: self.url.version().unwrap_or_default().to_string(),
            method_name: invocation.method_name().to_string(),
            parameter_types: invocation.parameter_types().to_vec(),
            arguments: invocation.arguments().to_vec(),
            attachments,
        }
    }
}

#[async_trait::async_trait]
impl Invoker for RemoteInvoker {
    fn interface(&self) -> &str {
        &self.interface
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn is_available(&self) -> bool {
        !self.destroyed.load(Ordering::SeqCst) && self.exchange.is_connected()
    }

    async fn invoke(&self, invocation: Invocation) -> RpcResult {
        if self.destroyed.load(Ordering::SeqCst) {
            return RpcResult::exception(RpcError::Network(format!("invoker for {} destroyed", self.url)));
        }

        let method = invocation.method_name().to_string();
        let body = self.request_body(&invocation);

        if self.is_oneway(&method) {
            return match self.exchange.oneway(body).await {
                Ok(()) => RpcResult::value(serde_json::Value::Null),
                Err(err) => RpcResult::exception(ProtocolError::from(err).into()),
            };
        }

        let timeout_ms = self.url.parameter_u64(&format!("methods.{method}.timeout"), 0);
        let timeout_ms = if timeout_ms == 0 {
            self.url.parameter_u64("timeout", DEFAULT_TIMEOUT_MS)
        } else {
            timeout_ms
        };

        match self.exchange.request(body, Duration::from_millis(timeout_ms)).await {
            Ok(response) => response_to_result(response),
            Err(err) => RpcResult::exception(ProtocolError::from(err).into()),
        }
    }

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

/// Maps a wire-level [`ExchangeResponse`] to the caller-facing
/// [`RpcResult`], translating §6's status codes into §7's stable error
/// kinds. `BIZ` payloads are preserved verbatim in [`RpcError::Biz`].
fn response_to_result(response: ExchangeResponse) -> RpcResult {
    match response.status {
        Status::Ok => match response.body {
            Some(ResponseBody::Value { value, attachments }) => RpcResult::Value { value, attachments },
            Some(ResponseBody::NullValue { attachments }) => RpcResult::Value {
                value: serde_json::Value::Null,
                attachments,
            },
            Some(ResponseBody::Exception { exception, attachments }) => RpcResult::Exception {
                error: Arc::new(RpcError::Biz(exception)),
                attachments,
            },
            Some(ResponseBody::NotFound { message, attachments }) => RpcResult::Exception {
                error: Arc::new(RpcError::forbidden(message)),
                attachments,
            },
            None => RpcResult::value(serde_json::Value::Null),
        },
        Status::ClientTimeout | Status::ServerTimeout => {
            RpcResult::exception(RpcError::timeout(format!("request {} timed out", response.id)))
        }
        Status::ServiceNotFound => RpcResult::exception(RpcError::forbidden("no provider for requested service key")),
        Status::BadRequest | Status::BadResponse => {
            RpcResult::exception(RpcError::Serialization("peer rejected a malformed frame".into()))
        }
        Status::ServiceError => match response.body {
            Some(ResponseBody::Exception { exception, attachments }) => RpcResult::Exception {
                error: Arc::new(RpcError::Biz(exception)),
                attachments,
            },
            _ => RpcResult::exception(RpcError::Unknown("remote service error with no payload".into())),
        },
        Status::ServerError | Status::ClientError => {
            RpcResult::exception(RpcError::Unknown("peer reported an internal error".into()))
        }
        Status::ServerThreadpoolExhausted => {
            RpcResult::exception(RpcError::LimitExceeded("provider thread pool exhausted".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_status_with_value_body_becomes_a_value_result() {
        let response = ExchangeResponse {
            id: 1,
            status: Status::Ok,
            body: Some(ResponseBody::Value {
                value: serde_json::json!("hello x"),
                attachments: Default::default(),
            }),
        };
        let result = response_to_result(response);
        assert_eq!(result.into_std().unwrap(), serde_json::json!("hello x"));
    }

    #[test]
    fn exception_body_preserves_biz_payload_verbatim() {
        let payload = serde_json::json!({"class": "IllegalArgumentException", "message": "bad input"});
        let response = ExchangeResponse {
            id: 2,
            status: Status::ServiceError,
            body: Some(ResponseBody::Exception {
                exception: payload.clone(),
                attachments: Default::default(),
            }),
        };
        let error = response_to_result(response).into_std().unwrap_err();
        match error {
            RpcError::Biz(value) => assert_eq!(value, payload),
            other => panic!("expected Biz, got {other:?}"),
        }
    }

    #[test]
    fn service_not_found_status_is_forbidden() {
        let response = ExchangeResponse {
            id: 3,
            status: Status::ServiceNotFound,
            body: None,
        };
        let error = response_to_result(response).into_std().unwrap_err();
        assert_eq!(error.kind(), rpc_core::ErrorKind::Forbidden);
    }

    #[test]
    fn client_timeout_status_is_timeout() {
        let response = ExchangeResponse {
            id: 4,
            status: Status::ClientTimeout,
            body: None,
        };
        let error = response_to_result(response).into_std().unwrap_err();
        assert_eq!(error.kind(), rpc_core::ErrorKind::Timeout);
    }
}
