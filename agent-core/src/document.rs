use serde::{Deserialize, Serialize};
use strum::Display;
use typed_builder::TypedBuilder;

/// The kind of document a control-channel message carries, mirroring the
/// inbound classification in §4.3: `InteractiveShell`/`ChannelClosed` map to
/// session start/cancel, `AgentJob` maps to a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum DocumentKind {
    SessionStart,
    SessionCancel,
    Command,
}

/// Parsed form of an inbound frame, ready to be handed to the processor's
/// `Submit`/`Cancel` contract. The core never interprets the payload; it
/// only threads it through to the external collaborator.
#[derive(Debug, Clone, TypedBuilder)]
pub struct DocumentState {
    pub message_id: String,
    pub kind: DocumentKind,
    pub payload: Vec<u8>,
}

/// Output produced by the processor for one document. Consumed exactly
/// once by the reply pipeline, which wraps it in a `ReplyEnvelope`. Carries
/// `serde` derives because a gave-up reply is persisted to disk verbatim
/// (§4.5's `{AgentResult, ReplyId, RetryNumber}` record).
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct DocumentResult {
    pub message_id: String,
    pub result_type: ResultType,
    pub status: DocumentStatus,
    #[builder(default)]
    pub plugin_outputs: Vec<PluginOutput>,
    #[builder(default)]
    pub last_plugin: bool,
    #[builder(default)]
    pub retry_number: u32,
}

/// Discriminates the reply policy applied by the reply pipeline (§4.4):
/// `AgentComplete` results get multiple continuous retries and
/// persistence-on-give-up, everything else gets one attempt and no
/// persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum ResultType {
    AgentComplete,
    StepUpdate,
    SessionOutput,
}

impl ResultType {
    pub fn policy(&self) -> ReplyPolicy {
        match self {
            Self::AgentComplete => ReplyPolicy {
                continuous_retries: 4,
                persist_on_give_up: true,
            },
            Self::StepUpdate | Self::SessionOutput => ReplyPolicy {
                continuous_retries: 0,
                persist_on_give_up: false,
            },
        }
    }
}

/// The per-reply-type policy derived from a `ResultType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyPolicy {
    pub continuous_retries: u32,
    pub persist_on_give_up: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum DocumentStatus {
    Success,
    Failed,
    Cancelled,
    InProgress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginOutput {
    pub plugin_name: String,
    pub output: Vec<u8>,
}
