//! Turns a registry URL (§6: `[[registries]]`) into a shared, cached
//! [`RegistryClient`] — one instance per distinct registry address, reused
//! across every service/reference that names the same registry, matching
//! the connection-pooling idiom `rpc-protocol` uses for transport endpoints.

use {
    rpc_registry::{CacheStore, CoordinatorBackend, MemoryBackend, RegistryBackend, RegistryClient},
    rpc_url::Url,
    std::sync::Arc,
};

const DEFAULT_CACHE_DIR: &str = ".rpc-registry-cache";

pub struct RegistryFactory {
    clients: dashmap::DashMap<String, Arc<RegistryClient>>,
    cache_root: std::path::PathBuf,
}

impl RegistryFactory {
    pub fn new() -> Self {
        Self::with_cache_root(DEFAULT_CACHE_DIR)
    }

    pub fn with_cache_root(cache_root: impl Into<std::path::PathBuf>) -> Self {
        Self {
            clients: dashmap::DashMap::new(),
            cache_root: cache_root.into(),
        }
    }

    /// Looks up (or builds) the client for `registry_url`'s address,
    /// dispatching on its scheme: `memory` backs onto an in-process
    /// [`MemoryBackend`] (tests, single-process demos); anything else is
    /// treated as a coordination-service address reachable over HTTP.
    pub fn client_for(&self, registry_url: &Url) -> Arc<RegistryClient> {
        let key = registry_url.address();
        if let Some(existing) = self.clients.get(&key) {
            return existing.clone();
        }

        let backend: Arc<dyn RegistryBackend> = if registry_url.protocol() == "memory" {
            Arc::new(MemoryBackend::new())
        } else {
            CoordinatorBackend::new(format!("{}://{}", registry_url.protocol(), registry_url.address()))
        };
        let root = registry_url.parameter_or("root", "rpc").to_string();
        let cache = CacheStore::new(self.cache_root.join(sanitize(&key)));
        let client = RegistryClient::new(backend, cache, root);

        self.clients.entry(key).or_insert(client).clone()
    }
}

impl Default for RegistryFactory {
    fn default() -> Self {
        Self::new()
    }
}

fn sanitize(address: &str) -> String {
    address
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_address_returns_the_same_client() {
        let dir = tempfile::tempdir().unwrap();
        let factory = RegistryFactory::with_cache_root(dir.path());
        let url = Url::new("memory", "127.0.0.1", 2181);

        let a = factory.client_for(&url);
        let b = factory.client_for(&url);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn distinct_addresses_get_distinct_clients() {
        let dir = tempfile::tempdir().unwrap();
        let factory = RegistryFactory::with_cache_root(dir.path());
        let a = factory.client_for(&Url::new("memory", "127.0.0.1", 1));
        let b = factory.client_for(&Url::new("memory", "127.0.0.1", 2));
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
