/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Wire-level message model shared by the client, relay and plugins.

use bytes::Bytes;
use std::fmt::{self, Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

/// Numeric message type carried in every backlog frame.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct MessageType(pub u8);

impl MessageType {
    /// Acknowledgment of a consumed message (acquisition side to deployment).
    pub const ACK: MessageType = MessageType(1);
    /// Keep-alive probe, sent by either side.
    pub const PING: MessageType = MessageType(2);
    /// Answer to [`MessageType::PING`].
    pub const PING_ACK: MessageType = MessageType(3);
    /// Raw TinyOS telemetry (MIG packets); also the type rebroadcast by the relay.
    pub const MIG: MessageType = MessageType(10);
    /// Backlog status report of the deployment.
    pub const BACKLOG_STATUS: MessageType = MessageType(11);

    /// Control types are handled by the client itself and never dispatched.
    pub fn is_control(self) -> bool {
        matches!(self, Self::ACK | Self::PING | Self::PING_ACK)
    }

    pub fn as_u8(self) -> u8 {
        self.0
    }
}

impl From<u8> for MessageType {
    fn from(value: u8) -> Self {
        MessageType(value)
    }
}

impl Display for MessageType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            Self::ACK => write!(f, "ack"),
            Self::PING => write!(f, "ping"),
            Self::PING_ACK => write!(f, "ping_ack"),
            Self::MIG => write!(f, "mig"),
            Self::BACKLOG_STATUS => write!(f, "backlog_status"),
            MessageType(other) => write!(f, "type_{other}"),
        }
    }
}

/// One framed unit exchanged with a deployment.
///
/// Timestamps are milliseconds since the epoch and are *not* unique across
/// message types.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BackLogMessage {
    pub message_type: MessageType,
    pub timestamp: i64,
    pub payload: Bytes,
}

impl BackLogMessage {
    pub fn new(message_type: MessageType, timestamp: i64, payload: impl Into<Bytes>) -> Self {
        Self {
            message_type,
            timestamp,
            payload: payload.into(),
        }
    }

    /// Builds a message stamped with the current wall-clock time.
    pub fn now(message_type: MessageType, payload: impl Into<Bytes>) -> Self {
        Self::new(message_type, current_timestamp_millis(), payload)
    }
}

/// Milliseconds since the epoch, clamped to zero for clocks set before 1970.
pub fn current_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::{BackLogMessage, MessageType};

    #[test]
    fn control_types_are_not_dispatchable() {
        assert!(MessageType::ACK.is_control());
        assert!(MessageType::PING.is_control());
        assert!(MessageType::PING_ACK.is_control());
        assert!(!MessageType::MIG.is_control());
        assert!(!MessageType(42).is_control());
    }

    #[test]
    fn display_uses_names_for_known_types() {
        assert_eq!(MessageType::MIG.to_string(), "mig");
        assert_eq!(MessageType(200).to_string(), "type_200");
    }

    #[test]
    fn now_stamps_a_positive_timestamp() {
        let message = BackLogMessage::now(MessageType::MIG, vec![1u8, 2, 3]);

        assert!(message.timestamp > 0);
        assert_eq!(message.payload.as_ref(), &[1, 2, 3]);
    }
}
