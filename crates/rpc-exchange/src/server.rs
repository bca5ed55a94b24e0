//! Server-side exchange: decodes inbound request frames, hands them to an
//! injected [`RequestHandler`], and replies on the same connection with a
//! response frame carrying the request's id (§4.3). Also answers heartbeat
//! event frames and reaps idle connections.

use {
    crate::message::{RequestBody, ResponseBody, SERIALIZATION_JSON},
    arc_swap::ArcSwapOption,
    rpc_transport::{
        ChannelHandler, Frame, Server as TransportServer, ServerConfig as TransportServerConfig, Status,
    },
    rpc_url::Url,
    std::{sync::Arc, time::Duration},
    tokio::time::Instant,
};

/// Injected by the protocol layer (C6): turns a decoded request into a
/// response body. Implementations run on whatever task the transport
/// dispatcher chose, so they may block on further async work.
#[async_trait::async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, peer: Url, request: RequestBody) -> ResponseBody;
}

pub struct ExchangeServer {
    transport: ArcSwapOption<TransportServer>,
    request_handler: Arc<dyn RequestHandler>,
    last_seen: dashmap::DashMap<String, Instant>,
}

struct ServerEventHandler {
    server: std::sync::Weak<ExchangeServer>,
}

#[async_trait::async_trait]
impl ChannelHandler for ServerEventHandler {
    async fn received(&self, peer: Url, frame: Frame) {
        if let Some(server) = self.server.upgrade() {
            server.last_seen.insert(peer.address(), Instant::now());
            server.handle_frame(peer, frame).await;
        }
    }

    async fn disconnected(&self, peer: Url) {
        if let Some(server) = self.server.upgrade() {
            server.last_seen.remove(&peer.address());
        }
    }
}

impl ExchangeServer {
    pub async fn bind(
        url: Url,
        request_handler: Arc<dyn RequestHandler>,
        idle_timeout: Duration,
    ) -> Result<Arc<Self>, crate::error::ExchangeError> {
        let server = Arc::new(ExchangeServer {
            transport: ArcSwapOption::empty(),
            request_handler,
            last_seen: dashmap::DashMap::new(),
        });
        let handler: Arc<dyn ChannelHandler> = Arc::new(ServerEventHandler {
            server: Arc::downgrade(&server),
        });
        let transport = TransportServer::bind(url, handler, TransportServerConfig::default()).await?;
        server.transport.store(Some(Arc::new(transport)));

        let reaper = server.clone();
        tokio::spawn(async move {
            idle_reaper(reaper, idle_timeout).await;
        });

        Ok(server)
    }

    pub fn local_url(&self) -> Url {
        self.transport.load().as_ref().expect("bound").local_url().clone()
    }

    pub fn connection_count(&self) -> usize {
        self.transport.load().as_ref().map(|t| t.connection_count()).unwrap_or(0)
    }

    pub fn close(&self) {
        if let Some(transport) = self.transport.load().as_ref() {
            transport.close();
        }
    }

    async fn handle_frame(&self, peer: Url, frame: Frame) {
        if frame.flags.event() {
            self.reply(&peer, Frame::heartbeat_response(frame.id, SERIALIZATION_JSON)).await;
            return;
        }
        if !frame.flags.is_request() {
            tracing::warn!(%peer, "exchange server received a response frame, ignoring");
            return;
        }

        let two_way = frame.flags.two_way();
        let request: RequestBody = match serde_json::from_slice(&frame.body) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(%peer, %err, "malformed request body");
                if two_way {
                    self.reply(&peer, Frame::response(frame.id, false, SERIALIZATION_JSON, Status::BadRequest, Vec::new()))
                        .await;
                }
                return;
            }
        };

        let response = self.request_handler.handle(peer.clone(), request).await;
        if !two_way {
            return;
        }
        let status = match &response {
            ResponseBody::Exception { .. } => Status::ServiceError,
            ResponseBody::NotFound { .. } => Status::ServiceNotFound,
            _ => Status::Ok,
        };
        let body = match serde_json::to_vec(&response) {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!(%peer, %err, "failed to encode response body");
                self.reply(&peer, Frame::response(frame.id, false, SERIALIZATION_JSON, Status::ServerError, Vec::new()))
                    .await;
                return;
            }
        };
        self.reply(&peer, Frame::response(frame.id, false, SERIALIZATION_JSON, status, body))
            .await;
    }

    async fn reply(&self, peer: &Url, frame: Frame) {
        let transport = self.transport.load();
        let Some(transport) = transport.as_ref() else {
            return;
        };
        let Some(channel) = transport.channel(&peer.address()) else {
            return;
        };
        if let Err(err) = channel.send(&frame).await {
            tracing::warn!(%peer, %err, "failed to send exchange reply");
        }
    }
}

async fn idle_reaper(server: Arc<ExchangeServer>, idle_timeout: Duration) {
    let mut ticker = tokio::time::interval(idle_timeout / 2);
    loop {
        ticker.tick().await;
        if Arc::strong_count(&server) == 1 {
            return;
        }
        let now = Instant::now();
        let stale: Vec<String> = server
            .last_seen
            .iter()
            .filter(|e| now.duration_since(*e.value()) >= idle_timeout)
            .map(|e| e.key().clone())
            .collect();
        for peer_addr in stale {
            tracing::debug!(peer = %peer_addr, "reaping idle connection");
            if let Some(transport) = server.transport.load().as_ref() {
                transport.disconnect(&peer_addr).await;
            }
            server.last_seen.remove(&peer_addr);
        }
    }
}
