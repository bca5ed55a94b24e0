//! `Filter`: an interceptor wrapping one side of an invoker (§4.7, C9).
//! A filter's `invoke` decides whether, when, and how to call `next`; it
//! may short-circuit (return without calling `next`), rewrite the
//! invocation, or post-process the result.

use {
    async_trait::async_trait,
    rpc_core::{BoxInvoker, Invocation, Invoker, RpcResult},
    rpc_extension::ExtensionLoader,
    rpc_url::Url,
    std::sync::Arc,
};

#[async_trait]
pub trait Filter: Send + Sync {
    async fn invoke(&self, next: &dyn Invoker, invocation: Invocation) -> RpcResult;
}

struct FilterInvoker {
    filter: Arc<dyn Filter>,
    next: BoxInvoker,
}

#[async_trait]
impl Invoker for FilterInvoker {
    fn interface(&self) -> &str {
        self.next.interface()
    }

    fn url(&self) -> &Url {
        self.next.url()
    }

    fn is_available(&self) -> bool {
        self.next.is_available()
    }

    async fn invoke(&self, invocation: Invocation) -> RpcResult {
        self.filter.invoke(self.next.as_ref(), invocation).await
    }

    fn destroy(&self) {
        self.next.destroy()
    }
}

/// Builds the static per-invoker filter chain (§4.7): extensions matching
/// `group` ("provider"/"consumer") and `url`'s `filters` parameter,
/// ordered by `ActivateSpec::order` then name, wrapped around `invoker`
/// from the last filter in to the first — so the first-listed filter is
/// the outermost one a caller actually hits.
pub fn build_chain(
    loader: &ExtensionLoader<dyn Filter>,
    url: &Url,
    group: &str,
    invoker: BoxInvoker,
) -> Result<BoxInvoker, rpc_extension::ExtensionError> {
    let filters = loader.get_activate_extension(url, "filters", group)?;
    let chained = filters.into_iter().rev().fold(invoker, |next, filter| {
        Arc::new(FilterInvoker { filter, next }) as BoxInvoker
    });
    Ok(chained)
}
