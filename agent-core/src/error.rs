use strum::Display;

/// Error taxonomy surfaced by the processor's `Submit` contract (§7). Each
/// variant carries the numeric ack status MGS expects in an `AgentJobAck`
/// and whether the inbound dispatcher is allowed to retry submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ProcessorErrorCode {
    Successful,
    ClosedProcessor,
    ProcessorBufferFull,
    UnexpectedDocumentType,
    ProcessorErrorCodeTranslationFailed,
    DuplicateCommand,
    InvalidDocument,
    ContainerNotSupported,
    AgentJobMessageParseError,
    UnexpectedError,
}

impl ProcessorErrorCode {
    /// The `StatusCode` reported back to MGS in an `AgentJobAck`.
    pub fn ack_status_code(&self) -> &'static str {
        match self {
            Self::Successful => "200",
            Self::ClosedProcessor => "51401",
            Self::ProcessorBufferFull => "51402",
            Self::UnexpectedDocumentType => "51403",
            Self::ProcessorErrorCodeTranslationFailed => "51404",
            Self::DuplicateCommand => "51405",
            Self::InvalidDocument => "51406",
            Self::ContainerNotSupported => "51407",
            Self::AgentJobMessageParseError => "51408",
            Self::UnexpectedError => "51499",
        }
    }

    /// Whether the inbound dispatcher may retry submission after this code.
    /// Only `ProcessorBufferFull` is retryable, and only up to a bounded
    /// ceiling — see `agent_control::dispatch` for the retry loop.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ProcessorBufferFull)
    }

    /// `true` when the processor accepted the submission and no ack frame
    /// needs to be sent back to MGS at all (§4.3: successful delivery is
    /// silent).
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Successful)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_buffer_full_is_retryable() {
        let retryable: Vec<_> = [
            ProcessorErrorCode::Successful,
            ProcessorErrorCode::ClosedProcessor,
            ProcessorErrorCode::ProcessorBufferFull,
            ProcessorErrorCode::UnexpectedDocumentType,
            ProcessorErrorCode::ProcessorErrorCodeTranslationFailed,
            ProcessorErrorCode::DuplicateCommand,
            ProcessorErrorCode::InvalidDocument,
            ProcessorErrorCode::ContainerNotSupported,
            ProcessorErrorCode::AgentJobMessageParseError,
            ProcessorErrorCode::UnexpectedError,
        ]
        .into_iter()
        .filter(ProcessorErrorCode::is_retryable)
        .collect();

        assert_eq!(retryable, vec![ProcessorErrorCode::ProcessorBufferFull]);
    }

    #[test]
    fn ack_codes_match_taxonomy() {
        assert_eq!(ProcessorErrorCode::Successful.ack_status_code(), "200");
        assert_eq!(ProcessorErrorCode::UnexpectedError.ack_status_code(), "51499");
    }
}
