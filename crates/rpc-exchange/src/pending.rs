//! The id generator and pending-request table (§4.3): every outbound
//! two-way request allocates a fresh monotonic id and registers a
//! one-shot completion slot; arrival of the matching response (or
//! timeout, or cancellation, or the owning connection dying) completes it
//! exactly once.

use {
    dashmap::DashMap,
    rpc_transport::Status,
    std::sync::atomic::{AtomicU64, Ordering},
    tokio::sync::oneshot,
};

#[derive(Debug, Clone)]
pub struct ExchangeResponse {
    pub id: u64,
    pub status: Status,
    pub body: Option<crate::message::ResponseBody>,
}

/// Wraparound is permitted (§4.3): ids are only ever compared for equality
/// against the open window of ids with a pending entry, never ordered, so
/// wrapping back to an id whose entry has long since been removed is safe.
pub struct IdGenerator(AtomicU64);

impl IdGenerator {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
pub struct PendingTable {
    entries: DashMap<u64, oneshot::Sender<ExchangeResponse>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: u64) -> oneshot::Receiver<ExchangeResponse> {
        let (tx, rx) = oneshot::channel();
        self.entries.insert(id, tx);
        rx
    }

    /// Completes and removes the pending entry for `response.id`, if any.
    /// Late/unmatched responses (already timed out, already cancelled, or
    /// simply unknown) are dropped silently, per §4.3.
    pub fn complete(&self, response: ExchangeResponse) {
        if let Some((_, tx)) = self.entries.remove(&response.id) {
            let _ = tx.send(response);
        }
    }

    /// Removes the entry without completing it; used by timeout/cancel,
    /// which complete the receiver's `Err` side themselves by dropping the
    /// sender (handled by the caller holding the other end).
    pub fn remove(&self, id: u64) -> Option<oneshot::Sender<ExchangeResponse>> {
        self.entries.remove(&id).map(|(_, tx)| tx)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drains every pending entry, dropping each sender so its waiter
    /// observes a closed channel — used when the owning connection dies
    /// and every pending future must resolve with a network error.
    pub fn drain(&self) -> Vec<u64> {
        let ids: Vec<u64> = self.entries.iter().map(|e| *e.key()).collect();
        for id in &ids {
            self.entries.remove(id);
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_generator_is_monotonic() {
        let gen = IdGenerator::new();
        let a = gen.next();
        let b = gen.next();
        assert!(b > a);
    }

    #[tokio::test]
    async fn complete_wakes_the_matching_waiter_only() {
        let table = PendingTable::new();
        let rx1 = table.register(1);
        let _rx2 = table.register(2);
        table.complete(ExchangeResponse {
            id: 1,
            status: Status::Ok,
            body: None,
        });
        let got = rx1.await.unwrap();
        assert_eq!(got.id, 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn unmatched_completion_is_a_silent_no_op() {
        let table = PendingTable::new();
        table.complete(ExchangeResponse {
            id: 999,
            status: Status::Ok,
            body: None,
        });
        assert!(table.is_empty());
    }
}
