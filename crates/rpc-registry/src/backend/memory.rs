//! An in-process backend: deterministic, no I/O, used by unit/integration
//! tests and single-process demos. Session loss is simulated explicitly
//! via [`MemoryBackend::simulate_session_loss`] rather than happening on
//! a timer, so tests control exactly when it occurs.

use {
    super::{RegistryBackend, SessionState},
    crate::error::RegistryError,
    dashmap::DashMap,
    tokio::sync::{broadcast, watch},
};

struct Node {
    ephemeral: bool,
}

pub struct MemoryBackend {
    // path -> (child name -> node)
    children: DashMap<String, DashMap<String, Node>>,
    watchers: DashMap<String, broadcast::Sender<()>>,
    state_tx: watch::Sender<SessionState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (state_tx, _rx) = watch::channel(SessionState::Connected);
        Self {
            children: DashMap::new(),
            watchers: DashMap::new(),
            state_tx,
        }
    }

    fn fire(&self, parent: &str) {
        if let Some(tx) = self.watchers.get(parent) {
            let _ = tx.send(());
        }
    }

    /// Drops every ephemeral node process-wide (mirroring a ZooKeeper
    /// session ending) and flips the session state to `SessionLost`, then
    /// `Connecting`. Watchers fire for every path that lost a child.
    pub fn simulate_session_loss(&self) {
        let _ = self.state_tx.send(SessionState::SessionLost);
        for entry in self.children.iter() {
            let path = entry.key().clone();
            let to_remove: Vec<String> = entry
                .value()
                .iter()
                .filter(|e| e.value().ephemeral)
                .map(|e| e.key().clone())
                .collect();
            if !to_remove.is_empty() {
                for name in &to_remove {
                    entry.value().remove(name);
                }
                self.fire(&path);
            }
        }
        let _ = self.state_tx.send(SessionState::Connecting);
    }

    /// Completes a reconnect: the client is expected to re-register and
    /// re-subscribe once it observes `Connecting`, then this flips the
    /// state to `Connected` so the client's final full notification goes
    /// out against live state.
    pub fn simulate_reconnect(&self) {
        let _ = self.state_tx.send(SessionState::Connected);
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RegistryBackend for MemoryBackend {
    async fn create_node(&self, path: &str, ephemeral: bool) -> Result<(), RegistryError> {
        let (parent, name) = split_path(path);
        self.children
            .entry(parent.clone())
            .or_default()
            .insert(name, Node { ephemeral });
        self.fire(&parent);
        Ok(())
    }

    async fn delete_node(&self, path: &str) -> Result<(), RegistryError> {
        let (parent, name) = split_path(path);
        if let Some(siblings) = self.children.get(&parent) {
            siblings.remove(&name);
        }
        self.fire(&parent);
        Ok(())
    }

    async fn children(&self, path: &str) -> Result<Vec<String>, RegistryError> {
        Ok(self
            .children
            .get(path)
            .map(|m| m.iter().map(|e| e.key().clone()).collect())
            .unwrap_or_default())
    }

    fn watch(&self, path: &str) -> broadcast::Receiver<()> {
        self.watchers
            .entry(path.to_string())
            .or_insert_with(|| broadcast::channel(64).0)
            .subscribe()
    }

    fn session_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }
}

fn split_path(path: &str) -> (String, String) {
    match path.rsplit_once('/') {
        Some((parent, name)) => (parent.to_string(), name.to_string()),
        None => (String::new(), path.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_children_lists_it() {
        let backend = MemoryBackend::new();
        backend.create_node("/root/svc/providers/u1", true).await.unwrap();
        let kids = backend.children("/root/svc/providers").await.unwrap();
        assert_eq!(kids, vec!["u1".to_string()]);
    }

    #[tokio::test]
    async fn session_loss_drops_only_ephemeral_nodes() {
        let backend = MemoryBackend::new();
        backend.create_node("/root/svc/providers/ephemeral", true).await.unwrap();
        backend
            .create_node("/root/svc/configurators/persistent", false)
            .await
            .unwrap();
        backend.simulate_session_loss();
        assert!(backend.children("/root/svc/providers").await.unwrap().is_empty());
        assert_eq!(
            backend.children("/root/svc/configurators").await.unwrap(),
            vec!["persistent".to_string()]
        );
    }

    #[tokio::test]
    async fn watch_fires_on_create() {
        let backend = MemoryBackend::new();
        let mut rx = backend.watch("/root/svc/providers");
        backend.create_node("/root/svc/providers/u1", true).await.unwrap();
        rx.recv().await.unwrap();
    }
}
