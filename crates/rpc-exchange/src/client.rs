//! Client-side exchange: allocates request ids, sends framed requests,
//! and resolves them from responses delivered by the transport layer's
//! dispatcher (§4.3). Owns the idle-heartbeat / reconnect loop.

use {
    crate::{
        error::ExchangeError,
        message::{RequestBody, SERIALIZATION_JSON},
        pending::{ExchangeResponse, IdGenerator, PendingTable},
    },
    arc_swap::ArcSwapOption,
    rpc_transport::{ChannelHandler, Client as TransportClient, ClientConfig, Frame, Status},
    rpc_url::Url,
    std::{
        sync::{
            Arc, Weak,
            atomic::{AtomicU64, Ordering},
        },
        time::Duration,
    },
    tokio::time::Instant,
};

/// Default idle threshold before a heartbeat is sent (§4.3).
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(60);

pub struct ExchangeClient {
    url: Url,
    transport: ArcSwapOption<TransportClient>,
    pending: Arc<PendingTable>,
    ids: IdGenerator,
    heartbeat: Duration,
    last_activity: Arc<AtomicActivity>,
    metrics: Option<Arc<rpc_observe::Metrics>>,
}

struct AtomicActivity(AtomicU64);

impl AtomicActivity {
    fn new(epoch: Instant) -> Self {
        Self(AtomicU64::new(Self::millis_since(epoch, Instant::now())))
    }

    fn millis_since(epoch: Instant, now: Instant) -> u64 {
        now.saturating_duration_since(epoch).as_millis() as u64
    }

    fn touch(&self, epoch: Instant) {
        self.0.store(Self::millis_since(epoch, Instant::now()), Ordering::SeqCst);
    }

    fn idle_for(&self, epoch: Instant) -> Duration {
        let last = self.0.load(Ordering::SeqCst);
        let now = Self::millis_since(epoch, Instant::now());
        Duration::from_millis(now.saturating_sub(last))
    }
}

struct ClientEventHandler {
    exchange: Weak<ExchangeClient>,
    epoch: Instant,
}

#[async_trait::async_trait]
impl ChannelHandler for ClientEventHandler {
    async fn connected(&self, peer: Url) {
        tracing::debug!(%peer, "exchange client connected");
        if let Some(ex) = self.exchange.upgrade() {
            ex.last_activity.touch(self.epoch);
        }
    }

    async fn disconnected(&self, peer: Url) {
        tracing::debug!(%peer, "exchange client disconnected");
        if let Some(ex) = self.exchange.upgrade() {
            for _ in ex.pending.drain() {}
        }
    }

    async fn received(&self, peer: Url, frame: Frame) {
        let Some(ex) = self.exchange.upgrade() else { return };
        ex.last_activity.touch(self.epoch);

        if frame.flags.is_request() {
            tracing::warn!(%peer, "exchange client received a request frame, ignoring");
            return;
        }
        if frame.flags.event() {
            // Heartbeat response: just completes liveness tracking above;
            // also resolve a pending heartbeat probe if one is waiting.
            ex.pending.complete(ExchangeResponse {
                id: frame.id,
                status: Status::Ok,
                body: None,
            });
            return;
        }

        let status = frame.status().unwrap_or(Status::BadResponse);
        let body = if frame.body.is_empty() {
            None
        } else {
            match serde_json::from_slice(&frame.body) {
                Ok(body) => Some(body),
                Err(err) => {
                    tracing::warn!(%peer, %err, "failed to decode response body");
                    None
                }
            }
        };
        ex.pending.complete(ExchangeResponse {
            id: frame.id,
            status,
            body,
        });
    }

    async fn caught(&self, peer: Url, error: rpc_transport::TransportError) {
        tracing::warn!(%peer, %error, "exchange client transport error");
        if let Some(ex) = self.exchange.upgrade() {
            for _ in ex.pending.drain() {}
        }
    }
}

impl ExchangeClient {
    pub async fn connect(url: Url, heartbeat: Duration) -> Result<Arc<Self>, ExchangeError> {
        Self::connect_with_metrics(url, heartbeat, None).await
    }

    pub async fn connect_with_metrics(
        url: Url,
        heartbeat: Duration,
        metrics: Option<Arc<rpc_observe::Metrics>>,
    ) -> Result<Arc<Self>, ExchangeError> {
        let epoch = Instant::now();
        let exchange = Arc::new(ExchangeClient {
            url: url.clone(),
            transport: ArcSwapOption::empty(),
            pending: Arc::new(PendingTable::new()),
            ids: IdGenerator::new(),
            heartbeat,
            last_activity: Arc::new(AtomicActivity::new(epoch)),
            metrics,
        });

        let handler: Arc<dyn ChannelHandler> = Arc::new(ClientEventHandler {
            exchange: Arc::downgrade(&exchange),
            epoch,
        });
        let transport_client = TransportClient::connect(&url, handler, ClientConfig::default()).await?;
        exchange.transport.store(Some(Arc::new(transport_client)));

        let heartbeat_exchange = exchange.clone();
        let heartbeat_epoch = epoch;
        tokio::spawn(async move {
            heartbeat_loop(heartbeat_exchange, heartbeat_epoch).await;
        });

        Ok(exchange)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_connected(&self) -> bool {
        self.transport
            .load()
            .as_ref()
            .map(|c| c.is_connected())
            .unwrap_or(false)
    }

    pub async fn request(&self, body: RequestBody, timeout: Duration) -> Result<ExchangeResponse, ExchangeError> {
        let id = self.ids.next();
        let rx = self.pending.register(id);
        let payload = serde_json::to_vec(&body)?;
        let frame = Frame::request(id, true, false, SERIALIZATION_JSON, payload);
        self.send_frame(&frame).await?;

        if let Some(metrics) = &self.metrics {
            metrics.pending_requests.inc();
        }
        let result = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_recv_closed)) => Err(ExchangeError::Cancelled(id)),
            Err(_elapsed) => {
                self.pending.remove(id);
                Err(ExchangeError::Timeout(id))
            }
        };
        if let Some(metrics) = &self.metrics {
            metrics.pending_requests.dec();
        }
        result
    }

    /// Fire-and-forget (§4.3): no id reserved, no future registered.
    pub async fn oneway(&self, body: RequestBody) -> Result<(), ExchangeError> {
        let payload = serde_json::to_vec(&body)?;
        let frame = Frame::request(0, false, false, SERIALIZATION_JSON, payload);
        self.send_frame(&frame).await
    }

    /// Completes the pending entry for `id` with `Cancelled` by dropping
    /// its sender (§4.3: "cancel completes the future with CANCELLED and
    /// removes the pending entry; late responses are dropped").
    pub fn cancel(&self, id: u64) {
        self.pending.remove(id);
    }

    async fn send_frame(&self, frame: &Frame) -> Result<(), ExchangeError> {
        let transport = self.transport.load();
        let Some(client) = transport.as_ref() else {
            return Err(ExchangeError::NotConnected);
        };
        client.send(frame).await?;
        self.last_activity.touch(Instant::now());
        Ok(())
    }

    async fn reconnect(&self) -> Result<(), ExchangeError> {
        tracing::info!(url = %self.url, "exchange client reconnecting after heartbeat timeout");
        for _ in self.pending.drain() {}
        let handler: Arc<dyn ChannelHandler> = Arc::new(NullHandler);
        let transport_client = TransportClient::connect(&self.url, handler, ClientConfig::default()).await?;
        self.transport.store(Some(Arc::new(transport_client)));
        Ok(())
    }
}

/// Placeholder handler installed only for the duration of a reconnect
/// attempt; the full [`ClientEventHandler`] re-attaches on the next
/// successful `connect_with_metrics` call in integration paths. Kept
/// separate so a failed reconnect cannot panic on an already-dropped
/// `Weak<ExchangeClient>`.
struct NullHandler;

#[async_trait::async_trait]
impl ChannelHandler for NullHandler {}

async fn heartbeat_loop(exchange: Arc<ExchangeClient>, epoch: Instant) {
    let mut ticker = tokio::time::interval(exchange.heartbeat / 2);
    loop {
        ticker.tick().await;
        if Arc::strong_count(&exchange) == 1 {
            // Only the loop itself holds a reference; the client was dropped.
            return;
        }
        let idle = exchange.last_activity.idle_for(epoch);
        if idle < exchange.heartbeat {
            continue;
        }
        let id = exchange.ids.next();
        let rx = exchange.pending.register(id);
        let frame = Frame::heartbeat_request(id, SERIALIZATION_JSON);
        if exchange.send_frame(&frame).await.is_err() {
            let _ = exchange.reconnect().await;
            continue;
        }
        match tokio::time::timeout(exchange.heartbeat * 2, rx).await {
            Ok(Ok(_)) => {}
            _ => {
                let _ = exchange.reconnect().await;
            }
        }
    }
}
