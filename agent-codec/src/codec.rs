use std::sync::atomic::{AtomicI64, Ordering};

use byteorder::{BigEndian, ByteOrder};
use uuid::Uuid;

use crate::error::WireError;
use crate::frame::AgentMessage;
use crate::message_type::MessageType;

/// Assigns a monotonically increasing sequence number to every outbound
/// frame this process builds, scoped to one counter per process as §3's
/// data model implies but does not spell out as an operation (see
/// SPEC_FULL §10.5).
#[derive(Debug, Default)]
pub struct SequenceAllocator(AtomicI64);

impl SequenceAllocator {
    pub fn new() -> Self {
        Self(AtomicI64::new(0))
    }

    pub fn next(&self) -> i64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// Serializes an `AgentMessage` into a complete wire frame with a freshly
/// computed payload digest. Panics only if the allocation for the output
/// buffer fails (per §4.1) — all other failure modes are represented by
/// `WireError` from `deserialize`/`validate`, not from `serialize`.
pub fn serialize(msg: &AgentMessage) -> Vec<u8> {
    let digest = msg.payload_digest();
    let mut buf = Vec::with_capacity(AgentMessage::HEADER_LENGTH + msg.payload.len());
    buf.resize(AgentMessage::HEADER_LENGTH, 0);

    BigEndian::write_u32(
        &mut buf[AgentMessage::HL_OFFSET..],
        AgentMessage::HEADER_LENGTH as u32,
    );
    buf[AgentMessage::MESSAGE_TYPE_OFFSET..AgentMessage::MESSAGE_TYPE_OFFSET + AgentMessage::MESSAGE_TYPE_LEN]
        .copy_from_slice(&msg.message_type.to_wire());
    BigEndian::write_u32(&mut buf[AgentMessage::SCHEMA_VERSION_OFFSET..], msg.schema_version);
    BigEndian::write_u64(&mut buf[AgentMessage::CREATED_DATE_OFFSET..], msg.created_date_ms);
    BigEndian::write_i64(&mut buf[AgentMessage::SEQUENCE_NUMBER_OFFSET..], msg.sequence_number);
    BigEndian::write_u64(&mut buf[AgentMessage::FLAGS_OFFSET..], msg.flags);
    buf[AgentMessage::MESSAGE_ID_OFFSET..AgentMessage::MESSAGE_ID_OFFSET + AgentMessage::MESSAGE_ID_LEN]
        .copy_from_slice(msg.message_id.as_bytes());
    buf[AgentMessage::PAYLOAD_DIGEST_OFFSET..AgentMessage::PAYLOAD_DIGEST_OFFSET + AgentMessage::PAYLOAD_DIGEST_LEN]
        .copy_from_slice(&digest);
    BigEndian::write_u32(
        &mut buf[AgentMessage::PAYLOAD_LENGTH_OFFSET..],
        msg.payload.len() as u32,
    );

    buf.extend_from_slice(&msg.payload);
    buf
}

/// Parses a complete wire frame, rejecting malformed input (§4.1, §8's
/// boundary behaviors). The declared header length, payload length, and
/// digest must all agree with the actual bytes.
pub fn deserialize(bytes: &[u8]) -> Result<AgentMessage, WireError> {
    if bytes.len() < AgentMessage::HEADER_LENGTH {
        return Err(WireError::Truncated);
    }

    let declared_header_len = BigEndian::read_u32(&bytes[AgentMessage::HL_OFFSET..]);
    if declared_header_len as usize != AgentMessage::HEADER_LENGTH {
        return Err(WireError::HeaderLengthMismatch {
            declared: declared_header_len,
            actual: AgentMessage::HEADER_LENGTH as u32,
        });
    }

    let mut type_field = [0u8; MessageType::WIRE_WIDTH];
    type_field.copy_from_slice(
        &bytes[AgentMessage::MESSAGE_TYPE_OFFSET..AgentMessage::MESSAGE_TYPE_OFFSET + AgentMessage::MESSAGE_TYPE_LEN],
    );
    let message_type = MessageType::from_wire(&type_field).ok_or(WireError::UnknownMessageType)?;

    let schema_version = BigEndian::read_u32(&bytes[AgentMessage::SCHEMA_VERSION_OFFSET..]);
    let created_date_ms = BigEndian::read_u64(&bytes[AgentMessage::CREATED_DATE_OFFSET..]);
    let sequence_number = BigEndian::read_i64(&bytes[AgentMessage::SEQUENCE_NUMBER_OFFSET..]);
    let flags = BigEndian::read_u64(&bytes[AgentMessage::FLAGS_OFFSET..]);

    let message_id = Uuid::from_slice(
        &bytes[AgentMessage::MESSAGE_ID_OFFSET..AgentMessage::MESSAGE_ID_OFFSET + AgentMessage::MESSAGE_ID_LEN],
    )
    .map_err(|_| WireError::Truncated)?;

    let digest = &bytes
        [AgentMessage::PAYLOAD_DIGEST_OFFSET..AgentMessage::PAYLOAD_DIGEST_OFFSET + AgentMessage::PAYLOAD_DIGEST_LEN];

    let declared_payload_len = BigEndian::read_u32(&bytes[AgentMessage::PAYLOAD_LENGTH_OFFSET..]);
    let actual_payload_len = (bytes.len() - AgentMessage::HEADER_LENGTH) as u32;
    if declared_payload_len != actual_payload_len {
        return Err(WireError::PayloadLengthMismatch {
            declared: declared_payload_len,
            actual: actual_payload_len,
        });
    }

    let payload = bytes[AgentMessage::HEADER_LENGTH..].to_vec();

    let msg = AgentMessage {
        message_type,
        schema_version,
        created_date_ms,
        sequence_number,
        flags,
        message_id,
        payload,
    };

    if msg.payload_digest().as_slice() != digest {
        return Err(WireError::DigestMismatch);
    }

    Ok(msg)
}

/// Enforces the type-independent invariants from §4.1: a non-empty message
/// id, a positive created-date, and (for the few types the core interprets)
/// a minimally well-formed payload.
pub fn validate(msg: &AgentMessage) -> Result<(), WireError> {
    if msg.message_id.is_nil() {
        return Err(WireError::EmptyMessageId);
    }
    if msg.created_date_ms == 0 {
        return Err(WireError::NonPositiveCreatedDate);
    }
    match msg.message_type {
        MessageType::AgentJob | MessageType::InteractiveShell | MessageType::AgentTaskReply => {
            if msg.payload.is_empty() {
                return Err(WireError::SchemaViolation);
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(message_type: MessageType, payload: Vec<u8>) -> AgentMessage {
        AgentMessage {
            message_type,
            schema_version: 1,
            created_date_ms: 1_700_000_000_000,
            sequence_number: 42,
            flags: 0,
            message_id: Uuid::new_v4(),
            payload,
        }
    }

    #[test]
    fn round_trips_a_well_formed_message() {
        let msg = sample(MessageType::AgentJob, b"hello".to_vec());
        let bytes = serialize(&msg);
        let parsed = deserialize(&bytes).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn empty_payload_round_trips_for_ack_types() {
        let msg = sample(MessageType::AgentJobReplyAck, Vec::new());
        let bytes = serialize(&msg);
        let parsed = deserialize(&bytes).unwrap();
        assert_eq!(parsed, msg);
        assert!(validate(&parsed).is_ok());
    }

    #[test]
    fn corrupted_payload_fails_digest_check() {
        let msg = sample(MessageType::AgentJob, b"hello".to_vec());
        let mut bytes = serialize(&msg);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(deserialize(&bytes), Err(WireError::DigestMismatch)));
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let msg = sample(MessageType::AgentJob, b"hello".to_vec());
        let bytes = serialize(&msg);
        assert!(matches!(deserialize(&bytes[..10]), Err(WireError::Truncated)));
    }

    #[test]
    fn unknown_message_type_tag_is_rejected() {
        let msg = sample(MessageType::AgentJob, b"hello".to_vec());
        let mut bytes = serialize(&msg);
        bytes[AgentMessage::MESSAGE_TYPE_OFFSET..AgentMessage::MESSAGE_TYPE_OFFSET + 7]
            .copy_from_slice(b"bogus\0\0");
        assert!(matches!(deserialize(&bytes), Err(WireError::UnknownMessageType)));
    }

    #[test]
    fn validate_rejects_nil_message_id() {
        let mut msg = sample(MessageType::AgentJob, b"hello".to_vec());
        msg.message_id = Uuid::nil();
        assert!(matches!(validate(&msg), Err(WireError::EmptyMessageId)));
    }

    #[test]
    fn validate_rejects_empty_payload_for_job_types() {
        let msg = sample(MessageType::AgentJob, Vec::new());
        assert!(matches!(validate(&msg), Err(WireError::SchemaViolation)));
    }

    #[test]
    fn sequence_allocator_is_monotonic() {
        let alloc = SequenceAllocator::new();
        let a = alloc.next();
        let b = alloc.next();
        let c = alloc.next();
        assert!(a < b && b < c);
    }

    proptest::proptest! {
        #[test]
        fn round_trip_is_lossless_for_arbitrary_payloads(payload in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..256)) {
            let msg = sample(MessageType::AgentTaskReply, payload);
            let bytes = serialize(&msg);
            let parsed = deserialize(&bytes).unwrap();
            proptest::prop_assert_eq!(parsed, msg);
        }
    }
}
