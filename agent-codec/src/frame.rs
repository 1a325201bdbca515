use uuid::Uuid;

use crate::message_type::MessageType;

/// The over-the-wire frame in both directions (§3, §4.1):
///
/// ```text
/// | HL |         MessageType (32)        |Ver|  CreatedDate  |   SeqNum      |
/// | Flags |         MessageId (16)       |         Digest (32)       |PayLen|
/// | Payload ... |
/// ```
///
/// All multi-byte integers are big-endian. `AgentMessage` is immutable once
/// built: it is produced by `serialize`/parsed by `deserialize` and never
/// mutated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentMessage {
    pub message_type: MessageType,
    pub schema_version: u32,
    pub created_date_ms: u64,
    pub sequence_number: i64,
    pub flags: u64,
    pub message_id: Uuid,
    pub payload: Vec<u8>,
}

impl AgentMessage {
    pub const HL_LEN: usize = 4;
    pub const MESSAGE_TYPE_LEN: usize = MessageType::WIRE_WIDTH;
    pub const SCHEMA_VERSION_LEN: usize = 4;
    pub const CREATED_DATE_LEN: usize = 8;
    pub const SEQUENCE_NUMBER_LEN: usize = 8;
    pub const FLAGS_LEN: usize = 8;
    pub const MESSAGE_ID_LEN: usize = 16;
    pub const PAYLOAD_DIGEST_LEN: usize = 32;
    pub const PAYLOAD_LENGTH_LEN: usize = 4;

    pub const HL_OFFSET: usize = 0;
    pub const MESSAGE_TYPE_OFFSET: usize = Self::HL_OFFSET + Self::HL_LEN;
    pub const SCHEMA_VERSION_OFFSET: usize = Self::MESSAGE_TYPE_OFFSET + Self::MESSAGE_TYPE_LEN;
    pub const CREATED_DATE_OFFSET: usize = Self::SCHEMA_VERSION_OFFSET + Self::SCHEMA_VERSION_LEN;
    pub const SEQUENCE_NUMBER_OFFSET: usize = Self::CREATED_DATE_OFFSET + Self::CREATED_DATE_LEN;
    pub const FLAGS_OFFSET: usize = Self::SEQUENCE_NUMBER_OFFSET + Self::SEQUENCE_NUMBER_LEN;
    pub const MESSAGE_ID_OFFSET: usize = Self::FLAGS_OFFSET + Self::FLAGS_LEN;
    pub const PAYLOAD_DIGEST_OFFSET: usize = Self::MESSAGE_ID_OFFSET + Self::MESSAGE_ID_LEN;
    pub const PAYLOAD_LENGTH_OFFSET: usize = Self::PAYLOAD_DIGEST_OFFSET + Self::PAYLOAD_DIGEST_LEN;

    /// Total fixed header length in bytes; this is the value the `HL` field
    /// itself carries.
    pub const HEADER_LENGTH: usize = Self::PAYLOAD_LENGTH_OFFSET + Self::PAYLOAD_LENGTH_LEN;

    pub fn payload_digest(&self) -> [u8; 32] {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(&self.payload);
        hasher.finalize().into()
    }
}
