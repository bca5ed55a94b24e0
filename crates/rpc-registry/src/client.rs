//! `RegistryClient`: register/unregister/subscribe/unsubscribe/lookup
//! (§4.2) over a `dyn RegistryBackend`, with the disk cache, reconnect
//! replay, and per-subscription-key serialized notification the contract
//! requires.

use {
    crate::{
        backend::{RegistryBackend, SessionState},
        cache::CacheStore,
        error::RegistryError,
        listener::NotifyListener,
    },
    dashmap::DashMap,
    percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS},
    rpc_url::Url,
    std::{
        collections::BTreeMap,
        sync::{
            atomic::{AtomicU64, Ordering},
            Arc,
        },
        time::Duration,
    },
    tokio::{sync::Mutex as AsyncMutex, task::JoinHandle},
};

/// Every category the contract's `*` wildcard expands to (§4.2 point 3).
pub const ALL_CATEGORIES: [&str; 4] = ["providers", "consumers", "routers", "configurators"];

/// Node names are a single path component, so the full URL string (which
/// contains `/` and `:`) is percent-encoded wholesale rather than relying
/// on the looser parameter-value escaping `Url` itself uses.
const NODE_ENCODE_SET: &AsciiSet = &CONTROLS.add(b'/').add(b'%').add(b'?').add(b'#');

const RETRY_INTERVAL: Duration = Duration::from_secs(5);

fn encode_node(url: &Url) -> String {
    utf8_percent_encode(&url.to_full_string(), NODE_ENCODE_SET).to_string()
}

fn decode_node(name: &str) -> Option<Url> {
    let decoded = percent_decode_str(name).decode_utf8().ok()?;
    Url::parse(&decoded).ok()
}

/// Parses the `category` query parameter of a *subscribe* URL: a
/// comma-separated list, or `*`/absent meaning every category.
fn requested_categories(url: &Url) -> Vec<String> {
    match url.parameter("category") {
        None => ALL_CATEGORIES.iter().map(|s| s.to_string()).collect(),
        Some(raw) => {
            let names: Vec<&str> = raw.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
            if names.contains(&"*") {
                ALL_CATEGORIES.iter().map(|s| s.to_string()).collect()
            } else {
                names.into_iter().map(String::from).collect()
            }
        }
    }
}

struct Subscription {
    id: u64,
    categories: Vec<String>,
    listener: Arc<dyn NotifyListener>,
}

/// Per-service-key state: the live subscription list (serialized behind
/// `notify_lock` so listener ordering per subscribe-url is respected,
/// §4.2 point 7) and one watch task per category currently subscribed to.
struct ServiceState {
    subscriptions: AsyncMutex<Vec<Subscription>>,
    notify_lock: AsyncMutex<()>,
    watch_tasks: std::sync::Mutex<BTreeMap<String, JoinHandle<()>>>,
}

impl Default for ServiceState {
    fn default() -> Self {
        Self {
            subscriptions: AsyncMutex::new(Vec::new()),
            notify_lock: AsyncMutex::new(()),
            watch_tasks: std::sync::Mutex::new(BTreeMap::new()),
        }
    }
}

pub struct RegistryClient {
    backend: Arc<dyn RegistryBackend>,
    cache: CacheStore,
    root: String,
    /// Every URL this process currently holds registered, so reconnect
    /// (§4.2 point 6) can replay them. Unregister removes the entry.
    registered: DashMap<String, Url>,
    /// Registrations that failed with `check=false` and are retried on a
    /// timer (§4.2 point 1) instead of being surfaced to the caller.
    register_retry: DashMap<String, Url>,
    services: DashMap<String, Arc<ServiceState>>,
    next_subscription_id: AtomicU64,
}

/// A handle returned by [`RegistryClient::subscribe`]; pass it, together
/// with the same subscribe `url`, to [`RegistryClient::unsubscribe`] to
/// remove just that listener.
#[derive(Clone, Copy)]
pub struct SubscriptionHandle {
    id: u64,
}

impl RegistryClient {
    pub fn new(backend: Arc<dyn RegistryBackend>, cache: CacheStore, root: impl Into<String>) -> Arc<Self> {
        let client = Arc::new(Self {
            backend,
            cache,
            root: root.into(),
            registered: DashMap::new(),
            register_retry: DashMap::new(),
            services: DashMap::new(),
            next_subscription_id: AtomicU64::new(1),
        });
        tokio::spawn(retry_loop(client.clone()));
        tokio::spawn(reconnect_loop(client.clone()));
        client
    }

    fn path_prefix(&self, service_key: &str, category: &str) -> String {
        format!("/{}/{}/{}", self.root, service_key, category)
    }

    fn node_path(&self, url: &Url) -> String {
        format!("{}/{}", self.path_prefix(url.service_key(), url.category()), encode_node(url))
    }

    /// §4.2 point 1: `check=false` swallows and retries; otherwise errors
    /// surface to the caller.
    pub async fn register(&self, url: Url) -> Result<(), RegistryError> {
        let key = url.to_full_string();
        match self.backend.create_node(&self.node_path(&url), url.dynamic()).await {
            Ok(()) => {
                self.registered.insert(key.clone(), url);
                self.register_retry.remove(&key);
                Ok(())
            }
            Err(err) => {
                self.registered.insert(key.clone(), url.clone());
                if url.check() {
                    Err(err)
                } else {
                    tracing::warn!(url = %url, %err, "registration failed, will retry in background");
                    self.register_retry.insert(key, url);
                    Ok(())
                }
            }
        }
    }

    pub async fn unregister(&self, url: &Url) -> Result<(), RegistryError> {
        let key = url.to_full_string();
        self.registered.remove(&key);
        self.register_retry.remove(&key);
        self.backend.delete_node(&self.node_path(url)).await
    }

    /// Current full state for `url.category()` under `url.service_key()`
    /// (§4.2 `lookup`). Falls back to the disk cache when the backend is
    /// unreachable (contract point 8).
    pub async fn lookup(&self, url: &Url) -> Result<Vec<Url>, RegistryError> {
        let service_key = url.service_key();
        let category = url.category();
        match self.list_category(service_key, category).await {
            Ok(urls) => Ok(urls),
            Err(err) => match self.cache.load(service_key).await {
                Some(mut categories) => Ok(categories.remove(category).unwrap_or_default()),
                None => Err(err),
            },
        }
    }

    async fn list_category(&self, service_key: &str, category: &str) -> Result<Vec<Url>, RegistryError> {
        let names = self.backend.children(&self.path_prefix(service_key, category)).await?;
        Ok(names.iter().filter_map(|n| decode_node(n)).collect())
    }

    /// Subscribes `listener` to `url`'s service key for the categories
    /// named by its `category` parameter (default all). Delivers one full
    /// notification per category immediately (§4.2 point 4), even when a
    /// category is empty (encoded as [`Url::empty`]).
    pub async fn subscribe(
        self: &Arc<Self>,
        url: &Url,
        listener: Arc<dyn NotifyListener>,
    ) -> Result<SubscriptionHandle, RegistryError> {
        let service_key = url.service_key().to_string();
        let categories = requested_categories(url);
        let state = self.services.entry(service_key.clone()).or_default().clone();

        let id = self.next_subscription_id.fetch_add(1, Ordering::SeqCst);
        {
            let mut subs = state.subscriptions.lock().await;
            subs.push(Subscription {
                id,
                categories: categories.clone(),
                listener: listener.clone(),
            });
        }

        for category in &categories {
            self.ensure_watch_task(&service_key, category, &state);
        }

        // Initial delivery: serialized with any concurrent watch-driven
        // notification via `notify_lock` (§4.2 point 7).
        let _guard = state.notify_lock.lock().await;
        for category in &categories {
            let urls = self.list_category(&service_key, category).await.unwrap_or_default();
            deliver(&listener, category, urls).await;
        }

        Ok(SubscriptionHandle { id })
    }

    pub async fn unsubscribe(&self, url: &Url, handle: SubscriptionHandle) {
        let service_key = url.service_key();
        let Some(state) = self.services.get(service_key).map(|e| e.clone()) else {
            return;
        };
        let mut subs = state.subscriptions.lock().await;
        subs.retain(|s| s.id != handle.id);
    }

    fn ensure_watch_task(&self, service_key: &str, category: &str, state: &Arc<ServiceState>) {
        let mut tasks = state.watch_tasks.lock().unwrap();
        if tasks.contains_key(category) {
            return;
        }
        let path = self.path_prefix(service_key, category);
        let mut rx = self.backend.watch(&path);
        let backend = self.backend.clone();
        let cache = self.cache.clone();
        let state = state.clone();
        let service_key = service_key.to_string();
        let category = category.to_string();
        let handle = tokio::spawn(async move {
            while rx.recv().await.is_ok() {
                let names = backend.children(&path).await.unwrap_or_default();
                let urls: Vec<Url> = names.iter().filter_map(|n| decode_node(n)).collect();

                let _guard = state.notify_lock.lock().await;
                let mut snapshot = cache.load(&service_key).await.unwrap_or_default();
                snapshot.insert(category.clone(), urls.clone());
                let _ = cache.store(&service_key, &snapshot).await;

                let subs = state.subscriptions.lock().await;
                for sub in subs.iter().filter(|s| s.categories.iter().any(|c| c == &category)) {
                    deliver(&sub.listener, &category, urls.clone()).await;
                }
            }
        });
        tasks.insert(category.to_string(), handle);
    }
}

/// Single notification delivery: the empty-category sentinel (§4.2 point
/// 4) is encoded right here so every call site gets it for free.
async fn deliver(listener: &Arc<dyn NotifyListener>, category: &str, urls: Vec<Url>) {
    if urls.is_empty() {
        listener.notify(category, vec![Url::empty(category)]).await;
    } else {
        listener.notify(category, urls).await;
    }
}

async fn retry_loop(client: Arc<RegistryClient>) {
    let mut ticker = tokio::time::interval(RETRY_INTERVAL);
    loop {
        ticker.tick().await;
        if Arc::strong_count(&client) == 1 {
            return;
        }
        let pending: Vec<(String, Url)> =
            client.register_retry.iter().map(|e| (e.key().clone(), e.value().clone())).collect();
        for (key, url) in pending {
            if client.backend.create_node(&client.node_path(&url), url.dynamic()).await.is_ok() {
                client.register_retry.remove(&key);
                tracing::info!(%url, "deferred registration succeeded");
            }
        }
    }
}

/// Watches the backend's session-state stream and replays registrations
/// plus fresh full notifications once it settles back on `Connected`
/// after having been `SessionLost`/`Connecting` (§4.2 point 6).
async fn reconnect_loop(client: Arc<RegistryClient>) {
    let mut rx = client.backend.session_state();
    let mut was_disconnected = false;
    loop {
        if rx.changed().await.is_err() {
            return;
        }
        if Arc::strong_count(&client) == 1 {
            return;
        }
        let state = *rx.borrow();
        match state {
            SessionState::SessionLost | SessionState::Connecting => was_disconnected = true,
            SessionState::Connected if was_disconnected => {
                was_disconnected = false;
                tracing::info!("registry backend reconnected, replaying registrations and subscriptions");
                for entry in client.registered.iter() {
                    let url = entry.value().clone();
                    let _ = client.backend.create_node(&client.node_path(&url), url.dynamic()).await;
                }
                for service in client.services.iter() {
                    let service_key = service.key().clone();
                    let state = service.value().clone();
                    let categories: Vec<String> = {
                        let subs = state.subscriptions.lock().await;
                        subs.iter().flat_map(|s| s.categories.clone()).collect()
                    };
                    let mut seen = std::collections::HashSet::new();
                    let _guard = state.notify_lock.lock().await;
                    for category in categories {
                        if !seen.insert(category.clone()) {
                            continue;
                        }
                        let urls = client.list_category(&service_key, &category).await.unwrap_or_default();
                        let subs = state.subscriptions.lock().await;
                        for sub in subs.iter().filter(|s| s.categories.contains(&category)) {
                            deliver(&sub.listener, &category, urls.clone()).await;
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::backend::memory::MemoryBackend, std::sync::Mutex};

    struct Recorder {
        notifications: Mutex<Vec<(String, Vec<Url>)>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                notifications: Mutex::new(Vec::new()),
            })
        }

        fn count(&self) -> usize {
            self.notifications.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl NotifyListener for Recorder {
        async fn notify(&self, category: &str, urls: Vec<Url>) {
            self.notifications.lock().unwrap().push((category.to_string(), urls));
        }
    }

    fn provider_url(service: &str, port: u16) -> Url {
        Url::new("rpc", "127.0.0.1", port).with_path(service)
    }

    fn subscribe_url(service: &str, categories: &str) -> Url {
        Url::new("rpc", "127.0.0.1", 0)
            .with_path(service)
            .add_parameter("category", categories)
    }

    #[tokio::test]
    async fn first_subscribe_delivers_one_notification_per_category_even_empty() {
        let backend = Arc::new(MemoryBackend::new());
        let dir = tempfile::tempdir().unwrap();
        let client = RegistryClient::new(backend, CacheStore::new(dir.path()), "rpc");

        let recorder = Recorder::new();
        client
            .subscribe(&subscribe_url("Hello", "providers,routers"), recorder.clone())
            .await
            .unwrap();

        assert_eq!(recorder.count(), 2);
        for (_, urls) in recorder.notifications.lock().unwrap().iter() {
            assert_eq!(urls.len(), 1);
            assert!(urls[0].is_empty_sentinel());
        }
    }

    #[tokio::test]
    async fn register_then_subscribe_sees_full_state() {
        let backend = Arc::new(MemoryBackend::new());
        let dir = tempfile::tempdir().unwrap();
        let client = RegistryClient::new(backend, CacheStore::new(dir.path()), "rpc");

        client.register(provider_url("Hello", 1)).await.unwrap();
        client.register(provider_url("Hello", 2)).await.unwrap();

        let recorder = Recorder::new();
        client
            .subscribe(&subscribe_url("Hello", "providers"), recorder.clone())
            .await
            .unwrap();

        let notifications = recorder.notifications.lock().unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].1.len(), 2);
    }

    #[tokio::test]
    async fn watch_driven_notification_reflects_new_registration() {
        let backend = Arc::new(MemoryBackend::new());
        let dir = tempfile::tempdir().unwrap();
        let client = RegistryClient::new(backend, CacheStore::new(dir.path()), "rpc");

        let recorder = Recorder::new();
        client
            .subscribe(&subscribe_url("Hello", "providers"), recorder.clone())
            .await
            .unwrap();
        assert_eq!(recorder.count(), 1); // initial empty notification

        client.register(provider_url("Hello", 1)).await.unwrap();
        // Give the watch task a moment to observe and re-list.
        for _ in 0..50 {
            if recorder.count() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(recorder.count(), 2);
        assert_eq!(recorder.notifications.lock().unwrap()[1].1.len(), 1);
    }

    #[tokio::test]
    async fn unregister_removes_url_from_next_notification() {
        let backend = Arc::new(MemoryBackend::new());
        let dir = tempfile::tempdir().unwrap();
        let client = RegistryClient::new(backend, CacheStore::new(dir.path()), "rpc");

        let u1 = provider_url("Hello", 1);
        let u2 = provider_url("Hello", 2);
        client.register(u1.clone()).await.unwrap();
        client.register(u2.clone()).await.unwrap();

        let recorder = Recorder::new();
        client
            .subscribe(&subscribe_url("Hello", "providers"), recorder.clone())
            .await
            .unwrap();
        client.unregister(&u1).await.unwrap();

        for _ in 0..50 {
            if recorder.count() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let notifications = recorder.notifications.lock().unwrap();
        let last = &notifications.last().unwrap().1;
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].port(), Some(2));
    }

    #[tokio::test]
    async fn lookup_falls_back_to_cache_semantics_when_empty() {
        let backend = Arc::new(MemoryBackend::new());
        let dir = tempfile::tempdir().unwrap();
        let client = RegistryClient::new(backend, CacheStore::new(dir.path()), "rpc");
        let found = client.lookup(&subscribe_url("Hello", "providers")).await.unwrap();
        assert!(found.is_empty());
    }
}
