use {crate::invoker::BoxInvoker, std::collections::BTreeMap, std::sync::Arc};

/// Caller-set metadata forwarded with a single invocation. Kept as a
/// `BTreeMap` rather than `HashMap` so that wire-level encoding is
/// deterministic, which matters for the consistent-hash load balancer when
/// attachments end up in the hash key.
pub type Attachments = BTreeMap<String, String>;

/// One RPC call in flight: method name, parameter types, arguments,
/// attachments, and (once the cluster has picked an endpoint) the target
/// invoker. Everything but the target is set by the caller and is immutable
/// from that point on; the target is filled in exactly once, by the cluster
/// invoker, before the call descends into the filter chain.
#[derive(Clone)]
pub struct Invocation {
    method_name: String,
    parameter_types: Vec<String>,
    arguments: Vec<serde_json::Value>,
    attachments: Attachments,
    target: Option<BoxInvoker>,
}

impl Invocation {
    pub fn new(
        method_name: impl Into<String>,
        parameter_types: Vec<String>,
        arguments: Vec<serde_json::Value>,
    ) -> Self {
        Self {
            method_name: method_name.into(),
            parameter_types,
            arguments,
            attachments: Attachments::new(),
            target: None,
        }
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn parameter_types(&self) -> &[String] {
        &self.parameter_types
    }

    pub fn arguments(&self) -> &[serde_json::Value] {
        &self.arguments
    }

    pub fn attachments(&self) -> &Attachments {
        &self.attachments
    }

    pub fn set_attachment(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attachments.insert(key.into(), value.into());
    }

    pub fn with_attachment(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attachment(key, value);
        self
    }

    pub fn target(&self) -> Option<&BoxInvoker> {
        self.target.as_ref()
    }

    /// Called exactly once by the cluster invoker after load-balancer
    /// selection, before the invocation descends into the filter chain.
    pub fn set_target(&mut self, invoker: Arc<dyn crate::invoker::Invoker>) {
        self.target = Some(invoker);
    }

    /// A fresh clone with a reset target, used by retrying failure policies
    /// so that attachments set while invoking the failed candidate do not
    /// leak into the next attempt.
    pub fn retry_clone(&self) -> Self {
        Self {
            target: None,
            ..self.clone()
        }
    }
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("method_name", &self.method_name)
            .field("parameter_types", &self.parameter_types)
            .field("arguments", &self.arguments)
            .field("attachments", &self.attachments)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_clone_drops_target_but_keeps_attachments() {
        let inv = Invocation::new("greet", vec!["String".into()], vec![serde_json::json!("x")])
            .with_attachment("trace-id", "abc");
        let retried = inv.retry_clone();
        assert!(retried.target().is_none());
        assert_eq!(retried.attachments().get("trace-id").unwrap(), "abc");
    }
}
