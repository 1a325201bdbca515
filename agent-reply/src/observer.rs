use uuid::Uuid;

use crate::envelope::ReplyEnvelope;

/// Test/metrics seam into the worker's retry and give-up decisions. A host
/// process has no need to implement this beyond the default no-op; it
/// exists so the end-to-end scenarios in §8 can assert on retry counts and
/// persistence decisions without inspecting the failed-reply directory's
/// timing directly.
pub trait ReplyObserver: Send + Sync {
    /// Called once per re-send, after the previous attempt went unacked and
    /// before the next attempt is made.
    fn on_retry(&self, _reply_id: Uuid, _attempt: u32) {}

    /// Called once, when continuous retries are exhausted, to decide
    /// whether this particular envelope should be written to the
    /// failed-reply directory. Defaults to the static policy
    /// (`ResultType::policy().persist_on_give_up`).
    fn should_persist(&self, envelope: &ReplyEnvelope) -> bool {
        envelope.policy.persist_on_give_up
    }

    /// Called when a reply is dropped for exceeding the write buffer limit
    /// (§4.4 step 2) — permanent, no retry, no persistence.
    fn on_oversize(&self, _reply_id: Uuid, _size: usize) {}
}

#[derive(Debug, Default)]
pub struct NoopReplyObserver;

impl ReplyObserver for NoopReplyObserver {}
