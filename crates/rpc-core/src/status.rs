//! Per-`(url, method)` invocation counters (§3 `RpcStatus`): `active`,
//! `total`, `failed`, `succeededElapsed`, `failedElapsed`. Read by the
//! least-active load balancer, written by the monitor filter around every
//! invocation (§4.7, §5: "RpcStatus counters: atomic increments; per
//! (url, method)").

use {
    dashmap::DashMap,
    std::sync::atomic::{AtomicU64, Ordering},
};

#[derive(Default)]
struct Counters {
    active: AtomicU64,
    total: AtomicU64,
    failed: AtomicU64,
    succeeded_elapsed_ms: AtomicU64,
    failed_elapsed_ms: AtomicU64,
}

/// A snapshot, copied out of the live atomics for callers that want a
/// consistent-enough read (load balancers only need `active`, but the
/// full snapshot is useful for diagnostics/tests).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub active: u64,
    pub total: u64,
    pub failed: u64,
    pub succeeded_elapsed_ms: u64,
    pub failed_elapsed_ms: u64,
}

/// A guard returned by [`RpcStatusRegistry::begin`]: increments `active`
/// on construction, decrements it on drop regardless of how the call
/// path exits (return, early `?`, panic-unwind), and records the
/// terminal counters on an explicit [`InvokeGuard::finish`] call.
pub struct InvokeGuard<'a> {
    registry: &'a RpcStatusRegistry,
    key: (String, String),
    finished: bool,
}

impl InvokeGuard<'_> {
    pub fn finish(mut self, success: bool, elapsed_ms: u64) {
        self.registry.end(&self.key.0, &self.key.1, success, elapsed_ms);
        self.finished = true;
    }
}

impl Drop for InvokeGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            // Caller dropped the guard without calling finish (e.g. a
            // panic unwound through it): still decrement active so the
            // counters never leak a permanently-inflated value.
            if let Some(counters) = self.registry.table.get(&self.key) {
                counters.active.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }
}

#[derive(Default)]
pub struct RpcStatusRegistry {
    table: DashMap<(String, String), Counters>,
}

impl RpcStatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call at invoke begin; returns a guard whose `finish` must be
    /// called at invoke end (success/failure + elapsed time).
    pub fn begin(&self, url_key: &str, method: &str) -> InvokeGuard<'_> {
        let key = (url_key.to_string(), method.to_string());
        let counters = self.table.entry(key.clone()).or_default();
        counters.active.fetch_add(1, Ordering::SeqCst);
        counters.total.fetch_add(1, Ordering::SeqCst);
        InvokeGuard {
            registry: self,
            key,
            finished: false,
        }
    }

    fn end(&self, url_key: &str, method: &str, success: bool, elapsed_ms: u64) {
        let key = (url_key.to_string(), method.to_string());
        if let Some(counters) = self.table.get(&key) {
            counters.active.fetch_sub(1, Ordering::SeqCst);
            if success {
                counters.succeeded_elapsed_ms.fetch_add(elapsed_ms, Ordering::SeqCst);
            } else {
                counters.failed.fetch_add(1, Ordering::SeqCst);
                counters.failed_elapsed_ms.fetch_add(elapsed_ms, Ordering::SeqCst);
            }
        }
    }

    pub fn active(&self, url_key: &str, method: &str) -> u64 {
        self.table
            .get(&(url_key.to_string(), method.to_string()))
            .map(|c| c.active.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub fn snapshot(&self, url_key: &str, method: &str) -> StatusSnapshot {
        match self.table.get(&(url_key.to_string(), method.to_string())) {
            Some(c) => StatusSnapshot {
                active: c.active.load(Ordering::SeqCst),
                total: c.total.load(Ordering::SeqCst),
                failed: c.failed.load(Ordering::SeqCst),
                succeeded_elapsed_ms: c.succeeded_elapsed_ms.load(Ordering::SeqCst),
                failed_elapsed_ms: c.failed_elapsed_ms.load(Ordering::SeqCst),
            },
            None => StatusSnapshot::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_increments_active_and_total_until_finish() {
        let registry = RpcStatusRegistry::new();
        let guard = registry.begin("rpc://h:1", "greet");
        assert_eq!(registry.active("rpc://h:1", "greet"), 1);
        guard.finish(true, 5);
        assert_eq!(registry.active("rpc://h:1", "greet"), 0);
        let snap = registry.snapshot("rpc://h:1", "greet");
        assert_eq!(snap.total, 1);
        assert_eq!(snap.failed, 0);
        assert_eq!(snap.succeeded_elapsed_ms, 5);
    }

    #[test]
    fn dropped_guard_without_finish_still_decrements_active() {
        let registry = RpcStatusRegistry::new();
        {
            let _guard = registry.begin("rpc://h:1", "greet");
            assert_eq!(registry.active("rpc://h:1", "greet"), 1);
        }
        assert_eq!(registry.active("rpc://h:1", "greet"), 0);
    }

    #[test]
    fn failed_finish_increments_failed_counter() {
        let registry = RpcStatusRegistry::new();
        registry.begin("rpc://h:1", "greet").finish(false, 3);
        let snap = registry.snapshot("rpc://h:1", "greet");
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.failed_elapsed_ms, 3);
    }
}
