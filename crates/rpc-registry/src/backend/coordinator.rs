//! A REST long-poll client over a coordination service's HTTP facade
//! (§4.2.1), grounded in this workspace's JSON-over-`reqwest`
//! inter-service client pattern: plain `Client`, JSON request/response,
//! `.error_for_status()` at the transport edge, translated into
//! `RegistryError` at the crate boundary rather than leaking `reqwest`
//! types.
//!
//! There is no real long-poll endpoint to connect to in this
//! reimplementation, so [`CoordinatorBackend::watch`] is backed by short
//! background polling per watched path; this is the one place the
//! backend abstraction's honesty stops at "eventually notices a change"
//! rather than "notices instantly", which the registry contract (§4.2
//! point 5: full-state notifications, not a latency guarantee) permits.

use {
    super::{RegistryBackend, SessionState},
    crate::error::RegistryError,
    dashmap::DashMap,
    rand::Rng,
    std::{
        sync::{
            Arc,
            atomic::{AtomicU32, Ordering},
        },
        time::Duration,
    },
    tokio::sync::{broadcast, watch},
};

const BACKOFF_FLOOR: Duration = Duration::from_millis(200);
const BACKOFF_CEILING: Duration = Duration::from_secs(30);
const CONSECUTIVE_FAILURES_BEFORE_SESSION_LOSS: u32 = 2;

pub struct CoordinatorBackend {
    client: reqwest::Client,
    base_url: String,
    poll_interval: Duration,
    watchers: DashMap<String, (broadcast::Sender<()>, Vec<String>)>,
    state_tx: watch::Sender<SessionState>,
    consecutive_failures: AtomicU32,
}

impl CoordinatorBackend {
    pub fn new(base_url: impl Into<String>) -> Arc<Self> {
        Self::with_poll_interval(base_url, Duration::from_secs(2))
    }

    pub fn with_poll_interval(base_url: impl Into<String>, poll_interval: Duration) -> Arc<Self> {
        let (state_tx, _rx) = watch::channel(SessionState::Connecting);
        let backend = Arc::new(Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            poll_interval,
            watchers: DashMap::new(),
            state_tx,
            consecutive_failures: AtomicU32::new(0),
        });
        tokio::spawn(connection_monitor(backend.clone()));
        backend
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        let _ = self.state_tx.send_if_modified(|s| {
            if *s != SessionState::Connected {
                *s = SessionState::Connected;
                true
            } else {
                false
            }
        });
    }

    fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= CONSECUTIVE_FAILURES_BEFORE_SESSION_LOSS {
            let _ = self.state_tx.send_if_modified(|s| {
                if *s == SessionState::Connected {
                    *s = SessionState::SessionLost;
                    true
                } else if *s != SessionState::Connecting {
                    *s = SessionState::Connecting;
                    true
                } else {
                    false
                }
            });
        }
    }

    async fn ping(&self) -> Result<(), RegistryError> {
        self.client
            .get(format!("{}/healthz", self.base_url))
            .send()
            .await
            .map_err(|e| RegistryError::Unreachable(e.to_string()))?
            .error_for_status()
            .map_err(|e| RegistryError::Backend(e.to_string()))?;
        Ok(())
    }
}

async fn connection_monitor(backend: Arc<CoordinatorBackend>) {
    let mut ticker = tokio::time::interval(backend.poll_interval);
    let mut backoff = BACKOFF_FLOOR;
    loop {
        ticker.tick().await;
        if Arc::strong_count(&backend) == 1 {
            return;
        }
        match backend.ping().await {
            Ok(()) => {
                backend.record_success();
                backoff = BACKOFF_FLOOR;
            }
            Err(_) => {
                backend.record_failure();
                let jitter = rand::thread_rng().gen_range(0..=backoff.as_millis() as u64 / 2 + 1);
                tokio::time::sleep(backoff + Duration::from_millis(jitter)).await;
                backoff = (backoff * 2).min(BACKOFF_CEILING);
            }
        }
        poll_watched_paths(&backend).await;
    }
}

async fn poll_watched_paths(backend: &CoordinatorBackend) {
    let paths: Vec<String> = backend.watchers.iter().map(|e| e.key().clone()).collect();
    for path in paths {
        let Ok(current) = backend.children(&path).await else {
            continue;
        };
        if let Some(mut entry) = backend.watchers.get_mut(&path) {
            let (tx, last) = &mut *entry;
            if *last != current {
                *last = current;
                let _ = tx.send(());
            }
        }
    }
}

#[async_trait::async_trait]
impl RegistryBackend for CoordinatorBackend {
    async fn create_node(&self, path: &str, ephemeral: bool) -> Result<(), RegistryError> {
        let resp = self
            .client
            .put(format!("{}/node", self.base_url))
            .query(&[("path", path), ("ephemeral", if ephemeral { "true" } else { "false" })])
            .send()
            .await
            .map_err(|e| RegistryError::Unreachable(e.to_string()))?;
        resp.error_for_status().map_err(|e| RegistryError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn delete_node(&self, path: &str) -> Result<(), RegistryError> {
        let resp = self
            .client
            .delete(format!("{}/node", self.base_url))
            .query(&[("path", path)])
            .send()
            .await
            .map_err(|e| RegistryError::Unreachable(e.to_string()))?;
        resp.error_for_status().map_err(|e| RegistryError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn children(&self, path: &str) -> Result<Vec<String>, RegistryError> {
        let resp = self
            .client
            .get(format!("{}/children", self.base_url))
            .query(&[("path", path)])
            .send()
            .await
            .map_err(|e| RegistryError::Unreachable(e.to_string()))?
            .error_for_status()
            .map_err(|e| RegistryError::Backend(e.to_string()))?;
        resp.json::<Vec<String>>()
            .await
            .map_err(|e| RegistryError::Backend(e.to_string()))
    }

    fn watch(&self, path: &str) -> broadcast::Receiver<()> {
        self.watchers
            .entry(path.to_string())
            .or_insert_with(|| (broadcast::channel(64).0, Vec::new()))
            .0
            .subscribe()
    }

    fn session_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }
}
