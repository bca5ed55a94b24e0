//! The exchange layer (§4.3, C4): request/response correlation on top of
//! `rpc-transport`'s framed, connection-oriented channels. A client side
//! ([`ExchangeClient`]) turns a `RequestBody` into an awaited future; a
//! server side ([`ExchangeServer`]) turns an inbound request frame into a
//! call against an injected [`RequestHandler`] and a reply frame.
//!
//! Heartbeats, idle-connection reaping, and reconnect live here rather
//! than in `rpc-transport`, since they require knowing what a request and
//! a response *are* (ids, pending futures) rather than just bytes.

pub mod client;
pub mod error;
pub mod message;
pub mod pending;
pub mod server;

pub use {
    client::{DEFAULT_HEARTBEAT, ExchangeClient},
    error::ExchangeError,
    message::{RequestBody, ResponseBody, SERIALIZATION_JSON},
    pending::{ExchangeResponse, IdGenerator, PendingTable},
    server::{ExchangeServer, RequestHandler},
};
