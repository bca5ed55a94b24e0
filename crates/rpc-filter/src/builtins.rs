//! Built-in filters named in §4.7: timeout, context attachment, generic
//! invocation marshaling, access log, monitor, exception wrapping, token
//! validation, execution-limit, tps-limit.

use {
    crate::filter::Filter,
    async_trait::async_trait,
    dashmap::DashMap,
    rpc_core::{ErrorKind, Invocation, Invoker, RpcError, RpcResult, RpcStatusRegistry},
    std::{
        sync::{
            atomic::{AtomicU64, Ordering},
            Arc,
        },
        time::{Duration, Instant},
    },
    tokio::sync::Semaphore,
};

const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Bounds the call with `next.url()`'s `timeout` parameter (ms, default
/// 5000); expiry surfaces as `RpcError::Timeout`.
#[derive(Default)]
pub struct TimeoutFilter;

#[async_trait]
impl Filter for TimeoutFilter {
    async fn invoke(&self, next: &dyn Invoker, invocation: Invocation) -> RpcResult {
        let timeout_ms = next.url().parameter_u64("timeout", DEFAULT_TIMEOUT_MS);
        let method = invocation.method_name().to_string();
        match tokio::time::timeout(Duration::from_millis(timeout_ms), next.invoke(invocation)).await {
            Ok(result) => result,
            Err(_) => RpcResult::exception(RpcError::timeout(format!(
                "{method} exceeded {timeout_ms}ms against {}",
                next.url()
            ))),
        }
    }
}

/// Stamps every outgoing call with the timestamp and target interface, so
/// downstream filters/transport see consistent attachments regardless of
/// what the caller set (§4.7 "context attachment").
#[derive(Default)]
pub struct ContextFilter;

#[async_trait]
impl Filter for ContextFilter {
    async fn invoke(&self, next: &dyn Invoker, invocation: Invocation) -> RpcResult {
        let mut invocation = invocation;
        invocation.set_attachment("interface", next.interface());
        invocation.set_attachment("path", next.url().path().unwrap_or_default());
        next.invoke(invocation).await
    }
}

/// No-op pass-through: by the time an invocation reaches the filter
/// chain it is already in the wire-agnostic `serde_json::Value` shape
/// `GenericInvoker` (C10, §4.8.1) produces, so there is no marshaling
/// left to do here — this filter exists as the documented seam (§4.7)
/// where a future typed/generic translation would be inserted.
#[derive(Default)]
pub struct GenericFilter;

#[async_trait]
impl Filter for GenericFilter {
    async fn invoke(&self, next: &dyn Invoker, invocation: Invocation) -> RpcResult {
        next.invoke(invocation).await
    }
}

#[derive(Default)]
pub struct AccessLogFilter;

#[async_trait]
impl Filter for AccessLogFilter {
    async fn invoke(&self, next: &dyn Invoker, invocation: Invocation) -> RpcResult {
        let method = invocation.method_name().to_string();
        let url = next.url().clone();
        tracing::info!(%url, method, "invoking");
        let started = Instant::now();
        let result = next.invoke(invocation).await;
        tracing::info!(%url, method, elapsed_ms = started.elapsed().as_millis() as u64, failed = result.is_exception(), "invoked");
        result
    }
}

/// Tracks active/total/failed counters per (url, method), independent of
/// whatever accounting the cluster invoker keeps on the consumer side —
/// this is the provider- or consumer-local view the monitor exports (§4.7,
/// §3 `RpcStatus`).
#[derive(Default)]
pub struct MonitorFilter {
    status: RpcStatusRegistry,
}

#[async_trait]
impl Filter for MonitorFilter {
    async fn invoke(&self, next: &dyn Invoker, invocation: Invocation) -> RpcResult {
        let url_key = next.url().to_full_string();
        let method = invocation.method_name().to_string();
        let guard = self.status.begin(&url_key, &method);
        let started = Instant::now();
        let result = next.invoke(invocation).await;
        guard.finish(!result.is_exception(), started.elapsed().as_millis() as u64);
        result
    }
}

/// Wraps an `RpcError::Unknown`/non-`Biz` exception with call context
/// (method, url, elapsed) without changing its `ErrorKind` (§7: "Filter
/// chain wraps exceptions to attach context ... without hiding the
/// kind").
#[derive(Default)]
pub struct ExceptionFilter;

#[async_trait]
impl Filter for ExceptionFilter {
    async fn invoke(&self, next: &dyn Invoker, invocation: Invocation) -> RpcResult {
        let method = invocation.method_name().to_string();
        let url = next.url().clone();
        let started = Instant::now();
        match next.invoke(invocation).await {
            RpcResult::Exception { error, attachments } if error.kind() != ErrorKind::Biz => {
                let elapsed = started.elapsed().as_millis();
                let wrapped = RpcError::Unknown(format!("{method} against {url} failed after {elapsed}ms: {error}"));
                RpcResult::Exception {
                    error: std::sync::Arc::new(wrapped),
                    attachments,
                }
            }
            other => other,
        }
    }
}

/// Rejects calls whose `token` attachment does not match `next.url()`'s
/// `token` parameter. A provider URL with no `token` parameter accepts
/// everything.
#[derive(Default)]
pub struct TokenValidationFilter;

#[async_trait]
impl Filter for TokenValidationFilter {
    async fn invoke(&self, next: &dyn Invoker, invocation: Invocation) -> RpcResult {
        if let Some(expected) = next.url().parameter("token") {
            if invocation.attachments().get("token").map(String::as_str) != Some(expected) {
                return RpcResult::exception(RpcError::forbidden("invalid or missing token"));
            }
        }
        next.invoke(invocation).await
    }
}

/// Bounds concurrent in-flight calls per method to `next.url()`'s
/// `executes` parameter (unset means unbounded). Permits are acquired for
/// the duration of the call and tracked per (url, method) since one
/// filter instance is shared by every invoker it wraps.
#[derive(Default)]
pub struct ExecutionLimitFilter {
    semaphores: DashMap<(String, String), Arc<Semaphore>>,
}

#[async_trait]
impl Filter for ExecutionLimitFilter {
    async fn invoke(&self, next: &dyn Invoker, invocation: Invocation) -> RpcResult {
        let Some(limit) = next.url().parameter("executes").and_then(|v| v.parse::<usize>().ok()) else {
            return next.invoke(invocation).await;
        };
        let key = (next.url().to_full_string(), invocation.method_name().to_string());
        let permit = {
            let entry = self.semaphores.entry(key).or_insert_with(|| Arc::new(Semaphore::new(limit)));
            entry.clone().try_acquire_owned()
        };
        match permit {
            Ok(permit) => {
                let result = next.invoke(invocation).await;
                drop(permit);
                result
            }
            Err(_) => RpcResult::exception(RpcError::LimitExceeded(format!(
                "execution limit {limit} reached for {}",
                invocation.method_name()
            ))),
        }
    }
}

/// Limits calls per method to `next.url()`'s `tps` parameter (calls per
/// second; unset means unbounded), using a simple fixed-window counter
/// reset once a second has elapsed since the window opened.
#[derive(Default)]
pub struct TpsLimitFilter {
    windows: DashMap<(String, String), TpsWindow>,
}

struct TpsWindow {
    opened_at: std::sync::Mutex<Instant>,
    count: AtomicU64,
}

impl Default for TpsWindow {
    fn default() -> Self {
        Self {
            opened_at: std::sync::Mutex::new(Instant::now()),
            count: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Filter for TpsLimitFilter {
    async fn invoke(&self, next: &dyn Invoker, invocation: Invocation) -> RpcResult {
        let Some(limit) = next.url().parameter("tps").and_then(|v| v.parse::<u64>().ok()) else {
            return next.invoke(invocation).await;
        };
        let key = (next.url().to_full_string(), invocation.method_name().to_string());
        let window = self.windows.entry(key).or_default();
        {
            let mut opened_at = window.opened_at.lock().unwrap();
            if opened_at.elapsed() >= Duration::from_secs(1) {
                *opened_at = Instant::now();
                window.count.store(0, Ordering::SeqCst);
            }
        }
        if window.count.fetch_add(1, Ordering::SeqCst) >= limit {
            return RpcResult::exception(RpcError::LimitExceeded(format!(
                "tps limit {limit} reached for {}",
                invocation.method_name()
            )));
        }
        drop(window);
        next.invoke(invocation).await
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rpc_core::BoxInvoker, rpc_url::Url, std::sync::Arc};

    struct Echo {
        url: Url,
        delay: Duration,
    }

    #[async_trait]
    impl Invoker for Echo {
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
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            RpcResult::value(serde_json::json!("ok"))
        }
        fn destroy(&self) {}
    }

    #[tokio::test]
    async fn timeout_filter_surfaces_timeout_error() {
        let echo: BoxInvoker = Arc::new(Echo {
            url: Url::new("rpc", "h", 1).add_parameter("timeout", "10"),
            delay: Duration::from_millis(100),
        });
        let filter = TimeoutFilter;
        let result = filter.invoke(echo.as_ref(), Invocation::new("greet", vec![], vec![])).await;
        assert!(result.is_exception());
    }

    #[tokio::test]
    async fn token_filter_rejects_missing_token() {
        let echo: BoxInvoker = Arc::new(Echo {
            url: Url::new("rpc", "h", 1).add_parameter("token", "secret"),
            delay: Duration::ZERO,
        });
        let filter = TokenValidationFilter;
        let result = filter.invoke(echo.as_ref(), Invocation::new("greet", vec![], vec![])).await;
        assert!(result.is_exception());
    }

    #[tokio::test]
    async fn execution_limit_filter_rejects_over_limit() {
        let echo: BoxInvoker = Arc::new(Echo {
            url: Url::new("rpc", "h", 1).add_parameter("executes", "1"),
            delay: Duration::from_millis(50),
        });
        let filter = Arc::new(ExecutionLimitFilter::default());

        let (first, second) = tokio::join!(
            filter.invoke(echo.as_ref(), Invocation::new("greet", vec![], vec![])),
            async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                filter.invoke(echo.as_ref(), Invocation::new("greet", vec![], vec![])).await
            }
        );
        assert!(!first.is_exception());
        assert!(second.is_exception());
    }
}
