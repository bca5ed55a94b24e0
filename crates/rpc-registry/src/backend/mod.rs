//! The backend abstraction the registry client is built against (§4.2.1):
//! a narrow ZooKeeper-shaped capability (`create_node`/`delete_node`/
//! `children`/`watch`) plus a session-state stream the client uses to
//! detect disconnect/reconnect and replay registrations/subscriptions.

pub mod coordinator;
pub mod memory;

use {crate::error::RegistryError, tokio::sync::{broadcast, watch}};

/// The registry client's reconnect state machine (§4.2): `Destroyed` is
/// terminal, every other state can transition back to `Connecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    SessionLost,
    Destroyed,
}

#[async_trait::async_trait]
pub trait RegistryBackend: Send + Sync {
    /// Creates `path` as a child node. `ephemeral` nodes disappear when
    /// the backend's session ends (§4.2 point 2); non-ephemeral ("dynamic
    /// = false") nodes persist across session loss.
    async fn create_node(&self, path: &str, ephemeral: bool) -> Result<(), RegistryError>;

    async fn delete_node(&self, path: &str) -> Result<(), RegistryError>;

    /// Full current child-name listing under `path`. Never a delta.
    async fn children(&self, path: &str) -> Result<Vec<String>, RegistryError>;

    /// Fires (empty payload, "go re-list") whenever the child set at
    /// `path` changes. A fresh receiver only observes future fires, so
    /// callers must call [`RegistryBackend::children`] once up front
    /// before entering the watch loop.
    fn watch(&self, path: &str) -> broadcast::Receiver<()>;

    /// The current and future session states; the client subscribes to
    /// detect `SessionLost -> Connecting -> Connected` and replay its
    /// registrations/subscriptions (§4.2 point 6).
    fn session_state(&self) -> watch::Receiver<SessionState>;
}
