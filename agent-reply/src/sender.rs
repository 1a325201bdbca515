use async_trait::async_trait;

use agent_codec::AgentMessage;

use crate::error::ReplySendError;

/// The send capability the reply pipeline is constructed with (§9 design
/// notes). Resolving the cyclic reference between the control channel and
/// the reply pipeline this way means `agent-reply` never depends on
/// `agent-control`: the control channel implements this trait and is handed
/// to the pipeline as a trait object, not the other way around.
#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn send(&self, message: AgentMessage) -> Result<(), ReplySendError>;

    /// Whether the underlying transport currently has a live socket. The
    /// durability loop (§4.5) uses this to decide whether to skip a cycle
    /// rather than enqueue replies that can only fail.
    fn is_open(&self) -> bool;
}
