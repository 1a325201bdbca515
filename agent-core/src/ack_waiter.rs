use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Concurrent map of in-flight reply acknowledgements (§5 "shared resources").
/// A reply worker registers a waiter keyed by the reply's message id before
/// sending; the control channel's inbound classifier resolves it by the same
/// id when an `AgentJobReplyAck`/`TaskAcknowledge` frame arrives. Either side
/// may remove the entry — the worker on timeout, the classifier on ack.
#[derive(Debug, Default)]
pub struct AckWaiterMap {
    waiters: DashMap<Uuid, oneshot::Sender<()>>,
}

impl AckWaiterMap {
    pub fn new() -> Self {
        Self { waiters: DashMap::new() }
    }

    /// Registers a waiter for `message_id` and returns a future that resolves
    /// when `resolve` is called with the same id, or times out after
    /// `backoff`. The entry is removed from the map in both outcomes.
    pub async fn wait(&self, message_id: Uuid, backoff: Duration) -> bool {
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(message_id, tx);

        let acked = matches!(tokio::time::timeout(backoff, rx).await, Ok(Ok(()))) ;
        self.waiters.remove(&message_id);
        acked
    }

    /// Resolves a pending waiter for `message_id`, if one is registered.
    /// Silently drops the ack when there is no matching waiter (§4.3).
    pub fn resolve(&self, message_id: Uuid) {
        if let Some((_, tx)) = self.waiters.remove(&message_id) {
            let _ = tx.send(());
        }
    }

    /// Lower-level half of `wait`: registers a waiter for `message_id` and
    /// hands back the receiving half, without blocking. Used by callers
    /// that need to register the waiter before a send attempt and only then
    /// decide how long to wait (the reply pipeline, per §4.4 step 1-4,
    /// which must not start the ack clock until the frame is on the wire).
    pub fn register(&self, message_id: Uuid) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(message_id, tx);
        rx
    }

    /// Removes a waiter without resolving it, e.g. after a send failure or
    /// an ack timeout where the caller already owns the receiver.
    pub fn remove(&self, message_id: Uuid) {
        self.waiters.remove(&message_id);
    }

    pub fn pending_count(&self) -> usize {
        self.waiters.len()
    }
}
