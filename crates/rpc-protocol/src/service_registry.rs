//! Server-side request dispatch (§4.5, C6): tracks which local invokers are
//! currently exported on a given transport endpoint, keyed the same way the
//! registry keys providers (§4.2 point 3: `[group/]interface[:version]`),
//! and answers [`rpc_exchange::RequestHandler::handle`] by looking one up.

use {
    rpc_core::{BoxInvoker, Invocation},
    rpc_exchange::{RequestBody, RequestHandler, ResponseBody},
    rpc_url::Url,
    std::collections::BTreeMap,
};

#[derive(Default)]
pub struct ServiceRequestHandler {
    services: dashmap::DashMap<String, BoxInvoker>,
}

impl ServiceRequestHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, service_key: String, invoker: BoxInvoker) {
        self.services.insert(service_key, invoker);
    }

    pub fn unregister(&self, service_key: &str) {
        self.services.remove(service_key);
    }

    /// Like [`Self::unregister`] but reports whether anything was actually
    /// removed, so callers can make `unexport` idempotent without keeping
    /// their own bookkeeping.
    pub fn unregister_if_present(&self, service_key: &str) -> bool {
        self.services.remove(service_key).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[async_trait::async_trait]
impl RequestHandler for ServiceRequestHandler {
    async fn handle(&self, peer: Url, request: RequestBody) -> ResponseBody {
        let service_key = request_service_key(&request);
        // Scoped so the `DashMap` ref (not `Send`) is released before the
        // `await` below.
        let invoker = match self.services.get(&service_key) {
            Some(entry) => entry.value().clone(),
            None => {
                tracing::warn!(%peer, service_key, "no exported provider for request");
                return ResponseBody::NotFound {
                    message: format!("no provider exported for {service_key}"),
                    attachments: BTreeMap::new(),
                };
            }
        };

        let invocation = Invocation::new(request.method_name, request.parameter_types, request.arguments)
            .with_attachments(request.attachments);

        match invoker.invoke(invocation).await.into_std() {
            Ok(value) if value.is_null() => ResponseBody::NullValue {
                attachments: BTreeMap::new(),
            },
            Ok(value) => ResponseBody::Value {
                value,
                attachments: BTreeMap::new(),
            },
            Err(error) => ResponseBody::Exception {
                exception: biz_payload(&error),
                attachments: BTreeMap::new(),
            },
        }
    }
}

/// Mirrors [`rpc_url::Url::compute_service_key`] using the wire-carried
/// `group` attachment in place of a URL parameter, since `RequestBody` has
/// no first-class group field (§6).
fn request_service_key(request: &RequestBody) -> String {
    let mut key = String::new();
    if let Some(group) = request.attachments.get("group") {
        if !group.is_empty() {
            key.push_str(group);
            key.push('/');
        }
    }
    key.push_str(&request.service_path);
    if !request.service_version.is_empty() {
        key.push(':');
        key.push_str(&request.service_version);
    }
    key
}

/// §7: a non-`Biz` exception still has to cross the wire as *some* JSON
/// payload; folding it into the same shape a `Biz` exception already uses
/// keeps `RemoteInvoker`'s decode path single-shaped.
fn biz_payload(error: &rpc_core::RpcError) -> serde_json::Value {
    match error {
        rpc_core::RpcError::Biz(value) => value.clone(),
        other => serde_json::json!({
            "kind": format!("{:?}", rpc_core::HasKind::kind(other)),
            "message": other.to_string(),
        }),
    }
}

trait InvocationAttachmentsExt {
    fn with_attachments(self, attachments: BTreeMap<String, String>) -> Self;
}

impl InvocationAttachmentsExt for Invocation {
    fn with_attachments(mut self, attachments: BTreeMap<String, String>) -> Self {
        for (k, v) in attachments {
            self.set_attachment(k, v);
        }
        self
    }
}
