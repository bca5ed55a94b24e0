//! `connect(url, handler) -> Client` (§4.4): a single outbound connection,
//! shared per host:port by the protocol layer (§4.5).

use {
    crate::{
        channel::{self, Channel},
        codec::DEFAULT_PAYLOAD_MAX,
        dispatcher::{ChannelHandler, Dispatcher, DispatcherKind},
        error::TransportError,
        frame::Frame,
        worker_pool::{WorkerPool, WorkerPoolKind},
    },
    rpc_url::Url,
    std::sync::Arc,
    tokio::net::TcpStream,
};

pub struct ClientConfig {
    pub dispatcher: DispatcherKind,
    pub worker_pool: WorkerPoolKind,
    pub worker_threads: usize,
    pub worker_queue_capacity: usize,
    pub payload_max: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            dispatcher: DispatcherKind::All,
            worker_pool: WorkerPoolKind::Fixed,
            worker_threads: 64,
            worker_queue_capacity: 1000,
            payload_max: DEFAULT_PAYLOAD_MAX,
        }
    }
}

pub struct Client {
    channel: Channel,
}

impl Client {
    pub async fn connect(
        url: &Url,
        handler: Arc<dyn ChannelHandler>,
        config: ClientConfig,
    ) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(url.address()).await?;
        let pool = Arc::new(WorkerPool::new(
            config.worker_pool,
            config.worker_threads,
            config.worker_queue_capacity,
        ));
        let dispatcher = Arc::new(Dispatcher::new(config.dispatcher, pool));
        let channel = channel::spawn(stream, url.clone(), handler, dispatcher, config.payload_max);
        Ok(Self { channel })
    }

    pub async fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        self.channel.send(frame).await
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }
}
