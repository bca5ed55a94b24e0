//! `RegistryDirectory` (§4.6, C8): the live provider list behind a
//! reference, kept current by subscribing to the registry (§4.2) and
//! refreshed in place as `providers`/`routers`/`configurators`
//! notifications arrive.

use {
    crate::{configurator::Configurator, router::ConditionRouter, router::Router},
    arc_swap::ArcSwap,
    async_trait::async_trait,
    dashmap::DashMap,
    rpc_core::{BoxInvoker, BoxProtocol, Invocation},
    rpc_registry::{NotifyListener, RegistryClient, SubscriptionHandle},
    rpc_url::Url,
    std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    tokio::sync::Mutex as AsyncMutex,
};

pub trait Directory: Send + Sync {
    /// Candidate invokers for `invocation`, after router filtering. The
    /// load balancer picks one from whatever this returns.
    fn list(&self, invocation: &Invocation) -> Vec<BoxInvoker>;

    fn interface(&self) -> &str;

    fn destroy(&self);
}

struct PendingRefresh {
    category: String,
    urls: Vec<Url>,
}

/// Collapses notifications that land while a refresh for the same
/// category is already in flight into a single follow-up pass (§9 binding
/// decision): the newest notification always wins, older ones in between
/// are dropped rather than queued, and at most one extra pass runs after
/// the in-flight one completes.
struct RefreshGate {
    in_progress: AtomicBool,
    pending: AsyncMutex<Option<PendingRefresh>>,
}

impl Default for RefreshGate {
    fn default() -> Self {
        Self {
            in_progress: AtomicBool::new(false),
            pending: AsyncMutex::new(None),
        }
    }
}

pub struct RegistryDirectory {
    registry: Arc<RegistryClient>,
    protocol: BoxProtocol,
    consumer_url: Url,
    interface: String,
    subscription: AsyncMutex<Option<SubscriptionHandle>>,
    raw_providers: AsyncMutex<Vec<Url>>,
    invokers: DashMap<String, BoxInvoker>,
    routers: ArcSwap<Vec<ConditionRouter>>,
    configurators: ArcSwap<Vec<Configurator>>,
    gate: RefreshGate,
    destroyed: AtomicBool,
}

impl RegistryDirectory {
    pub async fn subscribe(
        registry: Arc<RegistryClient>,
        protocol: BoxProtocol,
        consumer_url: Url,
    ) -> Result<Arc<Self>, rpc_registry::RegistryError> {
        let interface = consumer_url.interface().unwrap_or_default().to_string();
        let this = Arc::new(Self {
            registry: registry.clone(),
            protocol,
            consumer_url: consumer_url.clone(),
            interface,
            subscription: AsyncMutex::new(None),
            raw_providers: AsyncMutex::new(Vec::new()),
            invokers: DashMap::new(),
            routers: ArcSwap::from_pointee(Vec::new()),
            configurators: ArcSwap::from_pointee(Vec::new()),
            gate: RefreshGate::default(),
            destroyed: AtomicBool::new(false),
        });
        let handle = registry
            .subscribe(
                &consumer_url.add_parameter("category", "providers,routers,configurators"),
                this.clone(),
            )
            .await?;
        *this.subscription.lock().await = Some(handle);
        Ok(this)
    }

    async fn handle_notify(&self, category: String, urls: Vec<Url>) {
        match category.as_str() {
            "providers" => {
                *self.raw_providers.lock().await = urls;
                self.rebuild_providers().await;
            }
            "routers" => {
                let parsed = urls
                    .iter()
                    .filter(|u| !u.is_empty_sentinel())
                    .filter_map(|u| u.parameter("rule").map(ConditionRouter::parse))
                    .collect::<Vec<_>>();
                self.routers.store(Arc::new(parsed));
            }
            "configurators" => {
                let parsed = urls
                    .iter()
                    .filter(|u| !u.is_empty_sentinel())
                    .map(Configurator::from_url)
                    .collect::<Vec<_>>();
                self.configurators.store(Arc::new(parsed));
                self.rebuild_providers().await;
            }
            other => {
                tracing::debug!(category = other, "ignoring unknown registry category");
            }
        }
    }

    async fn rebuild_providers(&self) {
        let raw = self.raw_providers.lock().await.clone();
        let configurators = self.configurators.load();
        let mut effective_keys = Vec::with_capacity(raw.len());

        for provider_url in &raw {
            if provider_url.is_empty_sentinel() {
                continue;
            }
            let effective = crate::configurator::apply_all(provider_url.clone(), &configurators);
            let key = effective.to_full_string();
            effective_keys.push(key.clone());
            if !self.invokers.contains_key(&key) {
                match self.protocol.refer(&self.interface, effective).await {
                    Ok(invoker) => {
                        self.invokers.insert(key, invoker);
                    }
                    Err(error) => {
                        tracing::warn!(%error, url = %provider_url, "failed to refer provider");
                    }
                }
            }
        }

        let stale: Vec<String> = self
            .invokers
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|key| !effective_keys.contains(key))
            .collect();
        for key in stale {
            if let Some((_, invoker)) = self.invokers.remove(&key) {
                invoker.destroy();
            }
        }
    }
}

#[async_trait]
impl NotifyListener for RegistryDirectory {
    async fn notify(&self, category: &str, urls: Vec<Url>) {
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }
        if self
            .gate
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let mut next = Some(PendingRefresh {
                category: category.to_string(),
                urls,
            });
            while let Some(job) = next.take() {
                self.handle_notify(job.category, job.urls).await;
                next = self.gate.pending.lock().await.take();
            }
            self.gate.in_progress.store(false, Ordering::SeqCst);
        } else {
            *self.gate.pending.lock().await = Some(PendingRefresh {
                category: category.to_string(),
                urls,
            });
        }
    }
}

impl Directory for RegistryDirectory {
    fn list(&self, invocation: &Invocation) -> Vec<BoxInvoker> {
        let mut candidates: Vec<BoxInvoker> = self
            .invokers
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|invoker| invoker.is_available())
            .collect();
        for router in self.routers.load().iter() {
            candidates = router.route(&candidates, &self.consumer_url, invocation);
        }
        candidates
    }

    fn interface(&self) -> &str {
        &self.interface
    }

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        let registry = self.registry.clone();
        if let Some(handle) = self.subscription.try_lock().ok().and_then(|mut guard| guard.take()) {
            let consumer_url = self.consumer_url.clone();
            tokio::spawn(async move {
                registry.unsubscribe(&consumer_url, handle).await;
            });
        }
        for entry in self.invokers.iter() {
            entry.value().destroy();
        }
        self.invokers.clear();
    }
}
