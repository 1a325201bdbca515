use agent_codec::AgentMessage;
use agent_reply::{ReplySendError, ReplySender};

use crate::channel::ControlChannel;
use crate::error::ControlChannelError;

/// Implements the reply pipeline's send capability on top of the control
/// channel (§9 design notes). Kept in its own file rather than folded into
/// `channel.rs` so the dependency direction — `agent-control` depends on
/// `agent-reply`, never the reverse — stays visible at a glance.
#[async_trait::async_trait]
impl ReplySender for ControlChannel {
    async fn send(&self, message: AgentMessage) -> Result<(), ReplySendError> {
        self.send(message).await.map_err(|err| match err {
            ControlChannelError::NotOpen => ReplySendError::NotInitialized,
            other => ReplySendError::Other(other.to_string()),
        })
    }

    fn is_open(&self) -> bool {
        self.is_open()
    }
}
