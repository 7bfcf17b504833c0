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

//! TinyOS active-message (MIG) decoder.
//!
//! Packet layout, all big-endian:
//!
//! | offset | size | field |
//! |---|---|---|
//! | 0 | 2 | destination |
//! | 2 | 2 | source |
//! | 4 | 1 | data length |
//! | 5 | 1 | group id |
//! | 6 | 1 | active-message type |
//! | 7 | n | data |

use super::context::PluginContext;
use super::error::PluginError;
use super::params::{bytes_param, command_param, u16_param, u8_param};
use super::schema::{extract_row, schema_of, DataField, DataType, FieldSpec, FieldValue};
use super::{DecodeStatus, Plugin};
use crate::message::MessageType;
use async_trait::async_trait;
use bytes::{Buf, BufMut, BytesMut};
use serde_json::Value;

pub const MIG_PLUGIN_ID: &str = "mig";
pub const MIG_HEADER_LEN: usize = 7;

const SEND_COMMAND: &str = "send";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MigPacket {
    pub destination: u16,
    pub source: u16,
    pub group_id: u8,
    pub am_type: u8,
    pub data: Vec<u8>,
}

impl MigPacket {
    /// Trailing bytes past the declared data length are ignored.
    pub fn parse(payload: &[u8]) -> Result<Self, String> {
        if payload.len() < MIG_HEADER_LEN {
            return Err(format!(
                "packet of {} bytes is shorter than the {MIG_HEADER_LEN}-byte header",
                payload.len()
            ));
        }
        let mut buf = payload;
        let destination = buf.get_u16();
        let source = buf.get_u16();
        let length = buf.get_u8() as usize;
        let group_id = buf.get_u8();
        let am_type = buf.get_u8();
        if buf.remaining() < length {
            return Err(format!(
                "header declares {length} data bytes but only {} follow",
                buf.remaining()
            ));
        }
        Ok(Self {
            destination,
            source,
            group_id,
            am_type,
            data: buf[..length].to_vec(),
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, String> {
        let length = u8::try_from(self.data.len())
            .map_err(|_| format!("{} data bytes do not fit a MIG packet", self.data.len()))?;
        let mut buf = BytesMut::with_capacity(MIG_HEADER_LEN + self.data.len());
        buf.put_u16(self.destination);
        buf.put_u16(self.source);
        buf.put_u8(length);
        buf.put_u8(self.group_id);
        buf.put_u8(self.am_type);
        buf.put_slice(&self.data);
        Ok(buf.to_vec())
    }
}

fn destination(packet: &MigPacket) -> FieldValue {
    FieldValue::Integer(i32::from(packet.destination))
}

fn source(packet: &MigPacket) -> FieldValue {
    FieldValue::Integer(i32::from(packet.source))
}

fn group_id(packet: &MigPacket) -> FieldValue {
    FieldValue::SmallInt(i16::from(packet.group_id))
}

fn am_type(packet: &MigPacket) -> FieldValue {
    FieldValue::SmallInt(i16::from(packet.am_type))
}

fn data(packet: &MigPacket) -> FieldValue {
    FieldValue::Binary(packet.data.clone())
}

const MIG_FIELDS: &[FieldSpec<MigPacket>] = &[
    FieldSpec {
        field: DataField::new("destination", DataType::Integer, "destination node address"),
        extract: destination,
    },
    FieldSpec {
        field: DataField::new("source", DataType::Integer, "source node address"),
        extract: source,
    },
    FieldSpec {
        field: DataField::new("group_id", DataType::SmallInt, "radio group"),
        extract: group_id,
    },
    FieldSpec {
        field: DataField::new("am_type", DataType::SmallInt, "active-message type"),
        extract: am_type,
    },
    FieldSpec {
        field: DataField::new("data", DataType::Binary, "message data"),
        extract: data,
    },
];

#[derive(Default)]
pub struct MigPlugin {
    context: Option<PluginContext>,
}

impl MigPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    async fn send_packet(
        &self,
        param_names: &[String],
        param_values: &[Value],
    ) -> Result<bool, PluginError> {
        let context = self.context.as_ref().ok_or(PluginError::NotInitialized)?;
        let required = |name: &str| {
            command_param(param_names, param_values, name)
                .ok_or_else(|| PluginError::invalid_parameter(name, "missing"))
        };

        let packet = MigPacket {
            destination: u16_param(required("destination")?, "destination")?,
            source: 0,
            group_id: match command_param(param_names, param_values, "group_id") {
                Some(value) => u8_param(value, "group_id")?,
                None => 0,
            },
            am_type: u8_param(required("am_type")?, "am_type")?,
            data: bytes_param(required("data")?, "data")?,
        };
        let encoded = packet
            .encode()
            .map_err(|reason| PluginError::invalid_parameter("data", reason))?;

        Ok(context.send_remote(MessageType::MIG, encoded).await)
    }
}

#[async_trait]
impl Plugin for MigPlugin {
    fn initialize(&mut self, context: PluginContext) -> Result<(), PluginError> {
        self.context = Some(context);
        Ok(())
    }

    fn message_type(&self) -> MessageType {
        MessageType::MIG
    }

    fn decode(&mut self, timestamp: i64, payload: &[u8]) -> DecodeStatus {
        match MigPacket::parse(payload) {
            Ok(packet) => DecodeStatus::Processed {
                timestamp: Some(timestamp),
                fields: extract_row(MIG_FIELDS, &packet),
            },
            Err(reason) => DecodeStatus::rejected(reason),
        }
    }

    fn output_schema(&self) -> Vec<DataField> {
        schema_of(MIG_FIELDS)
    }

    async fn on_host_command(
        &mut self,
        action: &str,
        param_names: &[String],
        param_values: &[Value],
    ) -> Result<bool, PluginError> {
        if !action.eq_ignore_ascii_case(SEND_COMMAND) {
            return Err(PluginError::UnknownCommand(action.to_string()));
        }
        self.send_packet(param_names, param_values).await
    }

    /// Accepts `{"am_type": .., "destination": .., "data": ..}`.
    async fn on_host_object(&mut self, object: Value) -> Result<bool, PluginError> {
        let Value::Object(entries) = object else {
            return Err(PluginError::invalid_parameter("object", "expected a JSON object"));
        };
        let (names, values): (Vec<String>, Vec<Value>) = entries.into_iter().unzip();
        self.send_packet(&names, &values).await
    }

    fn stop(&mut self) {
        self.context = None;
    }
}

#[cfg(test)]
mod tests {
    use super::{MigPacket, MigPlugin};
    use crate::deployment::DeploymentId;
    use crate::plugin::{DecodeStatus, FieldValue, Plugin, PluginContext, PluginError};
    use serde_json::json;

    fn packet_bytes() -> Vec<u8> {
        vec![0xff, 0xff, 0x00, 0x05, 0x02, 0x22, 0x0a, 0xbe, 0xef]
    }

    #[test]
    fn decodes_header_and_data() {
        let mut plugin = MigPlugin::new();

        let status = plugin.decode(1_000, &packet_bytes());

        assert_eq!(
            status,
            DecodeStatus::Processed {
                timestamp: Some(1_000),
                fields: vec![
                    FieldValue::Integer(0xffff),
                    FieldValue::Integer(5),
                    FieldValue::SmallInt(0x22),
                    FieldValue::SmallInt(0x0a),
                    FieldValue::Binary(vec![0xbe, 0xef]),
                ],
            }
        );
        assert_eq!(plugin.output_schema().len(), 5);
    }

    #[test]
    fn truncated_packets_are_rejected() {
        let mut plugin = MigPlugin::new();

        assert!(matches!(
            plugin.decode(1, &[0x00, 0x01]),
            DecodeStatus::Rejected { .. }
        ));
        assert!(matches!(
            plugin.decode(1, &[0, 0, 0, 0, 9, 0, 0, 1]),
            DecodeStatus::Rejected { .. }
        ));
    }

    #[test]
    fn encode_round_trips_through_parse() {
        let packet = MigPacket::parse(&packet_bytes()).expect("packet should parse");

        assert_eq!(packet.encode().expect("packet should encode"), packet_bytes());
    }

    #[tokio::test]
    async fn send_command_without_link_reports_false() {
        let mut plugin = MigPlugin::new();
        plugin
            .initialize(PluginContext::new(DeploymentId::new("site1")))
            .expect("initialize should succeed");

        let sent = plugin
            .on_host_command(
                "send",
                &["am_type".to_string(), "destination".to_string(), "data".to_string()],
                &[json!(10), json!(1), json!([1, 2, 3])],
            )
            .await;

        assert_eq!(sent, Ok(false));
    }

    #[tokio::test]
    async fn unknown_commands_and_missing_params_are_errors() {
        let mut plugin = MigPlugin::new();
        plugin
            .initialize(PluginContext::new(DeploymentId::new("site1")))
            .expect("initialize should succeed");

        assert_eq!(
            plugin.on_host_command("reboot", &[], &[]).await,
            Err(PluginError::UnknownCommand("reboot".to_string()))
        );
        assert!(matches!(
            plugin.on_host_object(json!({ "am_type": 10 })).await,
            Err(PluginError::InvalidParameter { .. })
        ));
    }
}
