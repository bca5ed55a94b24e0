//! Register/unregister/subscribe/unsubscribe/lookup against a
//! reconnect-safe coordination-service backend (§4.2, C7).

pub mod backend;
pub mod cache;
pub mod client;
pub mod error;
pub mod listener;

pub use {
    backend::{coordinator::CoordinatorBackend, memory::MemoryBackend, RegistryBackend, SessionState},
    cache::CacheStore,
    client::{RegistryClient, SubscriptionHandle, ALL_CATEGORIES},
    error::RegistryError,
    listener::NotifyListener,
};
