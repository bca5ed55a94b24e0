//! A single connection: a read task that decodes frames off the socket and
//! drives the [`Dispatcher`], and a write half guarded by an async mutex so
//! writes from multiple callers stay FIFO on one connection (§5: "requests
//! on one connection are sent FIFO").

use {
    crate::{
        codec::{Codec, CodecError},
        dispatcher::Dispatcher,
        error::TransportError,
        frame::Frame,
    },
    rpc_buffer::Buffer,
    rpc_url::Url,
    std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    tokio::{
        io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf},
        net::TcpStream,
        sync::Mutex,
    },
};

const READ_CHUNK: usize = 4096;

/// A live connection to `peer`. Cheaply cloneable; every clone shares the
/// same write half and liveness flag.
#[derive(Clone)]
pub struct Channel {
    peer: Url,
    writer: Arc<Mutex<WriteHalf<TcpStream>>>,
    connected: Arc<AtomicBool>,
    codec_payload_max: usize,
}

impl Channel {
    pub fn peer(&self) -> &Url {
        &self.peer
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub async fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Closed);
        }
        let codec = Codec::new(self.codec_payload_max);
        let mut buf = Buffer::dynamic(256);
        codec.encode(frame, &mut buf)?;
        let mut writer = self.writer.lock().await;
        writer.write_all(buf.readable_slice()).await?;
        writer.flush().await?;
        Ok(())
    }

    fn mark_closed(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Shuts down the write half, signalling the peer to stop expecting
    /// further frames. Used by idle-connection reaping (§4.4).
    pub async fn shutdown(&self) -> Result<(), TransportError> {
        self.mark_closed();
        let mut writer = self.writer.lock().await;
        writer.shutdown().await?;
        Ok(())
    }
}

/// Splits `stream`, spawns the read loop that feeds `dispatcher`, and
/// returns the writable [`Channel`] handle immediately. `registry`, if
/// given, has this channel's key removed once the read loop observes EOF
/// or an unrecoverable error, so a server's connection table doesn't
/// accumulate dead entries.
pub fn spawn(
    stream: TcpStream,
    peer: Url,
    handler: Arc<dyn crate::dispatcher::ChannelHandler>,
    dispatcher: Arc<Dispatcher>,
    payload_max: usize,
) -> Channel {
    spawn_registered(stream, peer, handler, dispatcher, payload_max, None)
}

pub fn spawn_registered(
    stream: TcpStream,
    peer: Url,
    handler: Arc<dyn crate::dispatcher::ChannelHandler>,
    dispatcher: Arc<Dispatcher>,
    payload_max: usize,
    registry: Option<(Arc<dashmap::DashMap<String, Channel>>, String)>,
) -> Channel {
    let (read_half, write_half) = tokio::io::split(stream);
    let channel = Channel {
        peer: peer.clone(),
        writer: Arc::new(Mutex::new(write_half)),
        connected: Arc::new(AtomicBool::new(true)),
        codec_payload_max: payload_max,
    };

    let read_channel = channel.clone();
    tokio::spawn(async move {
        read_loop(read_half, peer, handler, dispatcher, payload_max, read_channel, registry).await;
    });

    channel
}

async fn read_loop(
    mut read_half: ReadHalf<TcpStream>,
    peer: Url,
    handler: Arc<dyn crate::dispatcher::ChannelHandler>,
    dispatcher: Arc<Dispatcher>,
    payload_max: usize,
    channel: Channel,
    registry: Option<(Arc<dashmap::DashMap<String, Channel>>, String)>,
) {
    let codec = Codec::new(payload_max);
    let mut buf = Buffer::dynamic(READ_CHUNK);
    dispatcher.dispatch_connected(handler.clone(), peer.clone());

    loop {
        let mut scratch = vec![0u8; READ_CHUNK];
        let n = match read_half.read(&mut scratch).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                dispatcher.dispatch_caught(handler.clone(), peer.clone(), err.into());
                break;
            }
        };
        buf.write_slice(&scratch[..n]).expect("dynamic buffer never rejects a write");

        let mut desynced = false;
        loop {
            match codec.decode(&mut buf) {
                Ok(Some(frame)) => {
                    dispatcher.dispatch_received(handler.clone(), peer.clone(), frame);
                }
                Ok(None) => break,
                Err(err @ CodecError::BodyTooLarge { .. }) => {
                    // Stream realigned itself: the codec already skipped
                    // the oversized body. Keep reading.
                    dispatcher.dispatch_caught(handler.clone(), peer.clone(), err.into());
                }
                Err(err @ CodecError::BadMagic) => {
                    // decode() leaves the reader index unadvanced on bad
                    // magic, so retrying here would spin forever on the
                    // same bytes (§8: malformed frame closes the
                    // connection instead).
                    dispatcher.dispatch_caught(handler.clone(), peer.clone(), err.into());
                    desynced = true;
                    break;
                }
                Err(err) => {
                    dispatcher.dispatch_caught(handler.clone(), peer.clone(), err.into());
                    desynced = true;
                    break;
                }
            }
        }
        if desynced {
            break;
        }
        buf.discard_read_bytes();
    }

    channel.mark_closed();
    if let Some((channels, key)) = registry {
        channels.remove(&key);
    }
    dispatcher.dispatch_disconnected(handler, peer);
}
