//! `ClusterInvoker` (§4.6 C8): wraps a [`Directory`] + [`LoadBalance`]
//! behind a single [`rpc_core::Invoker`], applying one of the cluster
//! failure policies around the call.

use {
    crate::{directory::Directory, error::ClusterError, load_balance::LoadBalance},
    arc_swap::ArcSwapOption,
    async_trait::async_trait,
    rpc_core::{BoxInvoker, Invocation, Invoker, RpcError, RpcResult, RpcStatusRegistry},
    rpc_url::Url,
    std::{sync::Arc, time::Duration},
};

#[derive(Debug, Clone, Copy)]
pub enum FailurePolicy {
    /// Retries against a different candidate up to `retries` additional
    /// times (so `retries + 1` attempts total).
    Failover { retries: u32 },
    /// One attempt; the error surfaces immediately.
    Failfast,
    /// One attempt; any error is swallowed and a `null` success returned.
    Failsafe,
    /// One attempt; on error, a background retry is scheduled and a
    /// `null` success is returned immediately, same as `Failsafe`.
    Failback { retries: u32 },
    /// Invokes `fork_size` candidates concurrently, returns the first
    /// success (or the last error if all fail).
    Forking { fork_size: usize },
    /// Invokes every candidate; succeeds only if all of them do.
    Broadcast,
    /// Picks among only the currently-available candidates, no retry.
    Available,
}

fn unwrap_error(error: Arc<RpcError>) -> RpcError {
    Arc::try_unwrap(error).unwrap_or_else(|e| RpcError::Unknown(e.to_string()))
}

fn targeted(invocation: &Invocation, invoker: &BoxInvoker) -> Invocation {
    let mut attempt = invocation.retry_clone();
    attempt.set_target(invoker.clone());
    attempt
}

pub struct ClusterInvoker {
    url: Url,
    directory: Arc<dyn Directory>,
    load_balance: Arc<dyn LoadBalance>,
    status: Arc<RpcStatusRegistry>,
    policy: FailurePolicy,
    sticky: bool,
    sticky_invoker: ArcSwapOption<dyn Invoker>,
}

impl ClusterInvoker {
    pub fn new(
        url: Url,
        directory: Arc<dyn Directory>,
        load_balance: Arc<dyn LoadBalance>,
        status: Arc<RpcStatusRegistry>,
        policy: FailurePolicy,
    ) -> Arc<Self> {
        let sticky = url.parameter_bool("sticky", false);
        Arc::new(Self {
            url,
            directory,
            load_balance,
            status,
            policy,
            sticky,
            sticky_invoker: ArcSwapOption::empty(),
        })
    }

    fn candidates(&self, invocation: &Invocation) -> Result<Vec<BoxInvoker>, ClusterError> {
        let mut candidates = self.directory.list(invocation);
        if self.sticky {
            if let Some(sticky) = self.sticky_invoker.load_full() {
                if candidates.iter().any(|c| Arc::ptr_eq(c, &sticky)) && sticky.is_available() {
                    return Ok(vec![sticky]);
                }
            }
        }
        candidates.retain(|c| c.is_available());
        if candidates.is_empty() {
            return Err(ClusterError::NoInvokerAvailable(invocation.method_name().to_string()));
        }
        Ok(candidates)
    }

    fn select(&self, candidates: &[BoxInvoker], invocation: &Invocation) -> Result<BoxInvoker, ClusterError> {
        let picked = self.load_balance.select(candidates, &self.status, invocation)?;
        if self.sticky {
            self.sticky_invoker.store(Some(picked.clone()));
        }
        Ok(picked)
    }

    async fn call_once(&self, invoker: &BoxInvoker, invocation: Invocation) -> RpcResult {
        let guard = self.status.begin(&invoker.url().to_full_string(), invocation.method_name());
        let started = std::time::Instant::now();
        let result = invoker.invoke(invocation).await;
        guard.finish(!result.is_exception(), started.elapsed().as_millis() as u64);
        result
    }

    async fn invoke_failover(&self, mut candidates: Vec<BoxInvoker>, invocation: &Invocation, attempts: u32) -> RpcResult {
        let method = invocation.method_name().to_string();
        let mut last_error: Option<RpcError> = None;
        for _ in 0..attempts {
            if candidates.is_empty() {
                break;
            }
            let invoker = match self.select(&candidates, invocation) {
                Ok(i) => i,
                Err(err) => {
                    last_error = Some(err.into());
                    break;
                }
            };
            let attempt = targeted(invocation, &invoker);
            match self.call_once(&invoker, attempt).await {
                RpcResult::Exception { error, .. } => {
                    last_error = Some(unwrap_error(error));
                    candidates.retain(|c| !Arc::ptr_eq(c, &invoker));
                }
                ok => return ok,
            }
        }
        RpcResult::exception(
            ClusterError::AllFailed {
                method,
                last: last_error.unwrap_or_else(|| RpcError::Unknown("no candidates".into())),
            }
            .into(),
        )
    }

    fn schedule_failback_retry(&self, mut candidates: Vec<BoxInvoker>, invocation: Invocation, retries: u32) {
        tokio::spawn(async move {
            for attempt in 0..retries {
                tokio::time::sleep(Duration::from_millis(500 * (attempt as u64 + 1))).await;
                candidates.retain(|c| c.is_available());
                let Some(invoker) = candidates.first().cloned() else {
                    continue;
                };
                let attempt_invocation = targeted(&invocation, &invoker);
                if !invoker.invoke(attempt_invocation).await.is_exception() {
                    return;
                }
            }
        });
    }

    async fn invoke_forking(&self, candidates: Vec<BoxInvoker>, invocation: &Invocation, fork_size: usize) -> RpcResult {
        let method = invocation.method_name().to_string();
        let chosen: Vec<BoxInvoker> = candidates.into_iter().take(fork_size.max(1)).collect();
        let calls = chosen.into_iter().map(|invoker| {
            let attempt = targeted(invocation, &invoker);
            async move { invoker.invoke(attempt).await }
        });
        let results = futures::future::join_all(calls).await;
        let mut last_error = None;
        for result in results {
            match result {
                RpcResult::Value { .. } => return result,
                RpcResult::Exception { error, .. } => last_error = Some(unwrap_error(error)),
            }
        }
        RpcResult::exception(
            ClusterError::AllFailed {
                method,
                last: last_error.unwrap_or(RpcError::Unknown("no candidates".into())),
            }
            .into(),
        )
    }

    async fn invoke_broadcast(&self, candidates: Vec<BoxInvoker>, invocation: &Invocation) -> RpcResult {
        let method = invocation.method_name().to_string();
        let mut last_value = None;
        let mut last_error = None;
        for invoker in &candidates {
            let attempt = targeted(invocation, invoker);
            match self.call_once(invoker, attempt).await {
                RpcResult::Value { value, attachments } => last_value = Some((value, attachments)),
                RpcResult::Exception { error, .. } => {
                    // Broadcast surfaces the *first* exception (unlike
                    // forking's last), while still invoking every candidate.
                    if last_error.is_none() {
                        last_error = Some(unwrap_error(error));
                    }
                }
            }
        }
        match last_error {
            Some(err) => RpcResult::exception(ClusterError::AllFailed { method, last: err }.into()),
            None => {
                let (value, attachments) = last_value.unwrap_or((serde_json::Value::Null, Default::default()));
                RpcResult::Value { value, attachments }
            }
        }
    }
}

#[async_trait]
impl Invoker for ClusterInvoker {
    fn interface(&self) -> &str {
        self.directory.interface()
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn is_available(&self) -> bool {
        !self.directory.list(&Invocation::new("$check", vec![], vec![])).is_empty()
    }

    async fn invoke(&self, invocation: Invocation) -> RpcResult {
        let candidates = match self.candidates(&invocation) {
            Ok(c) => c,
            Err(err) => return RpcResult::exception(err.into()),
        };

        match self.policy {
            FailurePolicy::Failfast => {
                let invoker = match self.select(&candidates, &invocation) {
                    Ok(i) => i,
                    Err(err) => return RpcResult::exception(err.into()),
                };
                let attempt = targeted(&invocation, &invoker);
                self.call_once(&invoker, attempt).await
            }
            FailurePolicy::Available => {
                // "Return first available invoker from directory" — no
                // load-balance selection, just directory order.
                let invoker = candidates[0].clone();
                let attempt = targeted(&invocation, &invoker);
                self.call_once(&invoker, attempt).await
            }
            FailurePolicy::Failsafe => {
                let invoker = match self.select(&candidates, &invocation) {
                    Ok(i) => i,
                    Err(_) => return RpcResult::value(serde_json::Value::Null),
                };
                let attempt = targeted(&invocation, &invoker);
                let result = self.call_once(&invoker, attempt).await;
                if result.is_exception() {
                    RpcResult::value(serde_json::Value::Null)
                } else {
                    result
                }
            }
            FailurePolicy::Failover { retries } => self.invoke_failover(candidates, &invocation, retries + 1).await,
            FailurePolicy::Failback { retries } => {
                let invoker = match self.select(&candidates, &invocation) {
                    Ok(i) => i,
                    Err(_) => return RpcResult::value(serde_json::Value::Null),
                };
                let attempt = targeted(&invocation, &invoker);
                let result = self.call_once(&invoker, attempt).await;
                if result.is_exception() {
                    self.schedule_failback_retry(candidates, invocation, retries);
                    RpcResult::value(serde_json::Value::Null)
                } else {
                    result
                }
            }
            FailurePolicy::Forking { fork_size } => self.invoke_forking(candidates, &invocation, fork_size).await,
            FailurePolicy::Broadcast => self.invoke_broadcast(candidates, &invocation).await,
        }
    }

    fn destroy(&self) {
        self.directory.destroy();
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::load_balance::Random,
        std::sync::atomic::{AtomicU32, Ordering},
    };

    struct FlakyInvoker {
        url: Url,
        fail_times: AtomicU32,
    }

    #[async_trait]
    impl Invoker for FlakyInvoker {
        fn interface(&self) -> &str {
            "Hello"
        }
        fn url(&self) -> &Url {
            &self.url
        }
        fn is_available(&self) -> bool {
            true
        }
        async fn invoke(&self, _invocation: Invocation) -> RpcResult {
            if self.fail_times.fetch_sub(1, Ordering::SeqCst) > 0 {
                RpcResult::exception(RpcError::Network("boom".into()))
            } else {
                RpcResult::value(serde_json::json!("ok"))
            }
        }
        fn destroy(&self) {}
    }

    struct StaticDirectory {
        invokers: Vec<BoxInvoker>,
    }

    impl Directory for StaticDirectory {
        fn list(&self, _invocation: &Invocation) -> Vec<BoxInvoker> {
            self.invokers.clone()
        }
        fn interface(&self) -> &str {
            "Hello"
        }
        fn destroy(&self) {}
    }

    #[tokio::test]
    async fn failover_retries_against_next_candidate() {
        let always_fails: BoxInvoker = Arc::new(FlakyInvoker {
            url: Url::new("rpc", "h1", 1),
            fail_times: AtomicU32::new(100),
        });
        let eventually_succeeds: BoxInvoker = Arc::new(FlakyInvoker {
            url: Url::new("rpc", "h2", 2),
            fail_times: AtomicU32::new(0),
        });
        let directory = Arc::new(StaticDirectory {
            invokers: vec![always_fails, eventually_succeeds],
        });
        let cluster = ClusterInvoker::new(
            Url::new("rpc", "consumer", 0),
            directory,
            Arc::new(Random),
            Arc::new(RpcStatusRegistry::new()),
            FailurePolicy::Failover { retries: 3 },
        );
        let invocation = Invocation::new("greet", vec![], vec![]);
        let result = cluster.invoke(invocation).await;
        assert!(!result.is_exception());
    }

    #[tokio::test]
    async fn failsafe_swallows_errors() {
        let failing: BoxInvoker = Arc::new(FlakyInvoker {
            url: Url::new("rpc", "h1", 1),
            fail_times: AtomicU32::new(100),
        });
        let directory = Arc::new(StaticDirectory { invokers: vec![failing] });
        let cluster = ClusterInvoker::new(
            Url::new("rpc", "consumer", 0),
            directory,
            Arc::new(Random),
            Arc::new(RpcStatusRegistry::new()),
            FailurePolicy::Failsafe,
        );
        let result = cluster.invoke(Invocation::new("greet", vec![], vec![])).await;
        assert!(!result.is_exception());
    }

    #[tokio::test]
    async fn failfast_surfaces_error_immediately() {
        let failing: BoxInvoker = Arc::new(FlakyInvoker {
            url: Url::new("rpc", "h1", 1),
            fail_times: AtomicU32::new(100),
        });
        let directory = Arc::new(StaticDirectory { invokers: vec![failing] });
        let cluster = ClusterInvoker::new(
            Url::new("rpc", "consumer", 0),
            directory,
            Arc::new(Random),
            Arc::new(RpcStatusRegistry::new()),
            FailurePolicy::Failfast,
        );
        let result = cluster.invoke(Invocation::new("greet", vec![], vec![])).await;
        assert!(result.is_exception());
    }
}
