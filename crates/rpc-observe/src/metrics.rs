//! Shared Prometheus registry (§1.1): pending-request gauge, per-(url,
//! method) RpcStatus counters, and registry notification counters. One
//! [`Metrics`] is constructed per process and cloned (cheaply, it's all
//! `Arc`-backed prometheus collectors) into the exchange and registry
//! crates.

use prometheus::{IntCounterVec, IntGauge, Opts, Registry};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub pending_requests: IntGauge,
    pub requests_total: IntCounterVec,
    pub requests_failed: IntCounterVec,
    pub notifications_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let pending_requests = IntGauge::new(
            "rpc_exchange_pending_requests",
            "number of exchange requests awaiting a response",
        )
        .unwrap();

        let requests_total = IntCounterVec::new(
            Opts::new("rpc_invocations_total", "completed invocations by url and method"),
            &["url", "method"],
        )
        .unwrap();

        let requests_failed = IntCounterVec::new(
            Opts::new("rpc_invocations_failed_total", "failed invocations by url and method"),
            &["url", "method"],
        )
        .unwrap();

        let notifications_total = IntCounterVec::new(
            Opts::new("rpc_registry_notifications_total", "registry notifications delivered by category"),
            &["category"],
        )
        .unwrap();

        registry.register(Box::new(pending_requests.clone())).unwrap();
        registry.register(Box::new(requests_total.clone())).unwrap();
        registry.register(Box::new(requests_failed.clone())).unwrap();
        registry.register(Box::new(notifications_total.clone())).unwrap();

        Self {
            registry,
            pending_requests,
            requests_total,
            requests_failed,
            notifications_total,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_queryable_after_increment() {
        let metrics = Metrics::new();
        metrics
            .requests_total
            .with_label_values(&["rpc://h:1", "greet"])
            .inc();
        let families = metrics.registry().gather();
        assert!(families.iter().any(|f| f.name() == "rpc_invocations_total"));
    }
}
