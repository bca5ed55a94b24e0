//! Server/client endpoints, codec, dispatcher, and worker pool (§4.4, C5).

pub mod channel;
pub mod client;
pub mod codec;
pub mod dispatcher;
pub mod error;
pub mod frame;
pub mod server;
pub mod worker_pool;

pub use {
    channel::Channel,
    client::{Client, ClientConfig},
    codec::Codec,
    dispatcher::{ChannelHandler, Dispatcher, DispatcherKind},
    error::TransportError,
    frame::{Frame, FrameFlags, Status},
    server::{Server, ServerConfig},
    worker_pool::{WorkerPool, WorkerPoolKind},
};
