use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("declared header length {declared} does not match encoded header length {actual}")]
    HeaderLengthMismatch { declared: u32, actual: u32 },

    #[error("declared payload length {declared} does not match actual payload length {actual}")]
    PayloadLengthMismatch { declared: u32, actual: u32 },

    #[error("payload digest mismatch")]
    DigestMismatch,

    #[error("unrecognized message type tag")]
    UnknownMessageType,

    #[error("frame is shorter than the fixed header")]
    Truncated,

    #[error("message id is empty")]
    EmptyMessageId,

    #[error("created-date must be positive")]
    NonPositiveCreatedDate,

    #[error("payload does not match schema for message type")]
    SchemaViolation,
}
