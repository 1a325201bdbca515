use std::str::FromStr;

use strum::{Display, EnumString};

/// Message types the core classifies and acts on (§4.1). MGS's wire
/// protocol carries more types than this; anything not listed here is
/// handled by the "anything else: logged and dropped" branch in §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum MessageType {
    InteractiveShell,
    ChannelClosed,
    AgentJob,
    AgentJobAck,
    AgentJobReplyAck,
    TaskAcknowledge,
    TaskComplete,
    AgentTaskReply,
}

impl MessageType {
    /// Header field is a fixed-width, right-padded ASCII string.
    pub const WIRE_WIDTH: usize = 32;

    /// Encodes this message type into the fixed-width header field,
    /// right-padded with NUL bytes.
    pub fn to_wire(self) -> [u8; Self::WIRE_WIDTH] {
        let mut buf = [0u8; Self::WIRE_WIDTH];
        let name = self.to_string();
        let bytes = name.as_bytes();
        buf[..bytes.len()].copy_from_slice(bytes);
        buf
    }

    /// Parses a fixed-width header field back into a `MessageType`.
    /// Unrecognized tags are not an error at this layer — `deserialize`
    /// turns them into `WireError::UnknownMessageType` only when strict
    /// classification is required; this function simply reports "no match".
    pub fn from_wire(field: &[u8; Self::WIRE_WIDTH]) -> Option<Self> {
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        let text = std::str::from_utf8(&field[..end]).ok()?;
        MessageType::from_str(text).ok()
    }
}
