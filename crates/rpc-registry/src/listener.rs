//! The narrow capability interface a subscriber implements (§9:
//! "listener inheritance hierarchies ... replaced with narrow capability
//! interfaces per event kind"). `RegistryDirectory` (in `rpc-cluster`) is
//! the primary implementer.

use rpc_url::Url;

#[async_trait::async_trait]
pub trait NotifyListener: Send + Sync {
    /// One full-state delivery for `category` (§4.2 point 5): `urls` is
    /// the complete current set, never a delta. An empty category is
    /// still delivered, as a single [`Url::empty`] sentinel (point 4).
    async fn notify(&self, category: &str, urls: Vec<Url>);
}
