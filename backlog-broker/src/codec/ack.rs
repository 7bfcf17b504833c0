//! Acknowledgment payloads. An ack names both the timestamp and the type it
//! confirms, since timestamps alone are ambiguous across types.

use crate::message::{BackLogMessage, MessageType};
use bytes::{Buf, BufMut, BytesMut};

const ACK_PAYLOAD_LEN: usize = 8 + 1;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Acknowledgment {
    pub message_type: MessageType,
    pub timestamp: i64,
}

impl Acknowledgment {
    pub fn new(message_type: MessageType, timestamp: i64) -> Self {
        Self {
            message_type,
            timestamp,
        }
    }

    pub fn to_message(self) -> BackLogMessage {
        let mut payload = BytesMut::with_capacity(ACK_PAYLOAD_LEN);
        payload.put_i64(self.timestamp);
        payload.put_u8(self.message_type.as_u8());
        BackLogMessage::now(MessageType::ACK, payload.freeze())
    }

    /// Returns `None` for non-ack messages or malformed ack payloads.
    pub fn from_message(message: &BackLogMessage) -> Option<Self> {
        if message.message_type != MessageType::ACK || message.payload.len() != ACK_PAYLOAD_LEN {
            return None;
        }
        let mut payload = message.payload.clone();
        let timestamp = payload.get_i64();
        let message_type = MessageType(payload.get_u8());
        Some(Self::new(message_type, timestamp))
    }
}
