use thiserror::Error;

/// Errors the reply pipeline surfaces internally. Distinct from
/// `ReplySendError`, which classifies failures of the send capability the
/// pipeline is constructed with (§9 design notes: dependency injection
/// around the control-channel/reply-pipeline cycle).
#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("serialized reply ({size} bytes) exceeds the write buffer limit ({limit} bytes)")]
    TooLarge { size: usize, limit: usize },

    #[error("failed-reply persistence error: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("failed-reply record could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Classifies a failure of the `ReplySender` capability (§7 propagation
/// policy: "errors containing 'ws not initialized' cause the worker to
/// persist and return without retry").
#[derive(Debug, Clone, Error)]
pub enum ReplySendError {
    #[error("ws not initialized")]
    NotInitialized,

    #[error("send failed: {0}")]
    Other(String),
}

impl ReplySendError {
    pub fn is_not_initialized(&self) -> bool {
        matches!(self, Self::NotInitialized)
    }
}
