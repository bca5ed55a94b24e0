//! `bind(url, handler) -> Server` (§4.4): accepts connections on
//! `url.host:url.port`, spawning one [`Channel`] per peer, all wired
//! through a shared [`Dispatcher`].

use {
    crate::{
        channel::{self, Channel},
        codec::DEFAULT_PAYLOAD_MAX,
        dispatcher::{ChannelHandler, Dispatcher, DispatcherKind},
        error::TransportError,
        worker_pool::{WorkerPool, WorkerPoolKind},
    },
    dashmap::DashMap,
    rpc_url::Url,
    std::sync::Arc,
    tokio::net::TcpListener,
};

pub struct ServerConfig {
    pub dispatcher: DispatcherKind,
    pub worker_pool: WorkerPoolKind,
    pub worker_threads: usize,
    pub worker_queue_capacity: usize,
    pub payload_max: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            dispatcher: DispatcherKind::All,
            worker_pool: WorkerPoolKind::Fixed,
            worker_threads: 200,
            worker_queue_capacity: 1000,
            payload_max: DEFAULT_PAYLOAD_MAX,
        }
    }
}

/// A bound server. Dropping it does not stop the accept loop; call
/// [`Server::close`] for an orderly shutdown (channel.destroy semantics
/// live one layer up, at the protocol/exporter level).
pub struct Server {
    local_url: Url,
    channels: Arc<DashMap<String, Channel>>,
    close_tx: tokio::sync::watch::Sender<bool>,
}

impl Server {
    pub async fn bind(
        url: Url,
        handler: Arc<dyn ChannelHandler>,
        config: ServerConfig,
    ) -> Result<Self, TransportError> {
        let addr = url.address();
        let listener = TcpListener::bind(&addr).await?;
        let channels: Arc<DashMap<String, Channel>> = Arc::new(DashMap::new());
        let pool = Arc::new(WorkerPool::new(
            config.worker_pool,
            config.worker_threads,
            config.worker_queue_capacity,
        ));
        let dispatcher = Arc::new(Dispatcher::new(config.dispatcher, pool));
        let (close_tx, mut close_rx) = tokio::sync::watch::channel(false);

        let accept_channels = channels.clone();
        let accept_dispatcher = dispatcher.clone();
        let accept_handler = handler.clone();
        let payload_max = config.payload_max;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = close_rx.changed() => break,
                    accepted = listener.accept() => {
                        let Ok((stream, peer_addr)) = accepted else { continue };
                        let peer_url = Url::new("rpc", peer_addr.ip().to_string(), peer_addr.port());
                        let key = peer_url.address();
                        let channel = channel::spawn_registered(
                            stream,
                            peer_url,
                            accept_handler.clone(),
                            accept_dispatcher.clone(),
                            payload_max,
                            Some((accept_channels.clone(), key.clone())),
                        );
                        accept_channels.insert(key, channel);
                    }
                }
            }
        });

        Ok(Self {
            local_url: url,
            channels,
            close_tx,
        })
    }

    pub fn local_url(&self) -> &Url {
        &self.local_url
    }

    pub fn channel(&self, peer_addr: &str) -> Option<Channel> {
        self.channels.get(peer_addr).map(|c| c.clone())
    }

    pub fn connection_count(&self) -> usize {
        self.channels.len()
    }

    pub fn peers(&self) -> Vec<String> {
        self.channels.iter().map(|e| e.key().clone()).collect()
    }

    /// Shuts down and drops the channel for `peer_addr`, if still present.
    pub async fn disconnect(&self, peer_addr: &str) {
        if let Some((_, channel)) = self.channels.remove(peer_addr) {
            let _ = channel.shutdown().await;
        }
    }

    pub fn close(&self) {
        let _ = self.close_tx.send(true);
    }
}
