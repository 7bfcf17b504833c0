//! Deployment backlog status decoder.

use super::context::PluginContext;
use super::error::PluginError;
use super::schema::{extract_row, schema_of, DataField, DataType, FieldSpec, FieldValue};
use super::{DecodeStatus, Plugin};
use crate::message::MessageType;
use async_trait::async_trait;
use bytes::{Buf, Bytes};
use serde_json::Value;

pub const BACKLOG_STATUS_PLUGIN_ID: &str = "backlog-status";

const STATUS_LEN: usize = 4 + 4 + 8 + 8;
const STATUS_REQUEST_COMMAND: &str = "status_request";

struct BacklogStatus {
    uptime_secs: u32,
    db_entries: u32,
    db_size: i64,
    min_timestamp: i64,
}

const STATUS_FIELDS: &[FieldSpec<BacklogStatus>] = &[
    FieldSpec {
        field: DataField::new("uptime", DataType::BigInt, "deployment uptime in seconds"),
        extract: |status: &BacklogStatus| FieldValue::BigInt(i64::from(status.uptime_secs)),
    },
    FieldSpec {
        field: DataField::new("db_entries", DataType::BigInt, "messages held in the backlog"),
        extract: |status: &BacklogStatus| FieldValue::BigInt(i64::from(status.db_entries)),
    },
    FieldSpec {
        field: DataField::new("db_size", DataType::BigInt, "backlog size in bytes"),
        extract: |status: &BacklogStatus| FieldValue::BigInt(status.db_size),
    },
    FieldSpec {
        field: DataField::new(
            "min_timestamp",
            DataType::BigInt,
            "oldest unacknowledged timestamp",
        ),
        extract: |status: &BacklogStatus| FieldValue::BigInt(status.min_timestamp),
    },
];

#[derive(Default)]
pub struct BacklogStatusPlugin {
    context: Option<PluginContext>,
}

impl BacklogStatusPlugin {
    pub fn new() -> Self {
        Self::default()
    }
}

fn parse_status(payload: &[u8]) -> Result<BacklogStatus, String> {
    if payload.len() != STATUS_LEN {
        return Err(format!(
            "status payload is {} bytes, expected {STATUS_LEN}",
            payload.len()
        ));
    }
    let mut buf = payload;
    let uptime_secs = buf.get_u32();
    let db_entries = buf.get_u32();
    let db_size = i64::try_from(buf.get_u64()).map_err(|_| "db_size overflows i64".to_string())?;
    let min_timestamp = buf.get_i64();
    Ok(BacklogStatus {
        uptime_secs,
        db_entries,
        db_size,
        min_timestamp,
    })
}

#[async_trait]
impl Plugin for BacklogStatusPlugin {
    fn initialize(&mut self, context: PluginContext) -> Result<(), PluginError> {
        self.context = Some(context);
        Ok(())
    }

    fn message_type(&self) -> MessageType {
        MessageType::BACKLOG_STATUS
    }

    fn decode(&mut self, timestamp: i64, payload: &[u8]) -> DecodeStatus {
        match parse_status(payload) {
            Ok(status) => DecodeStatus::Processed {
                timestamp: Some(timestamp),
                fields: extract_row(STATUS_FIELDS, &status),
            },
            Err(reason) => DecodeStatus::rejected(reason),
        }
    }

    fn output_schema(&self) -> Vec<DataField> {
        schema_of(STATUS_FIELDS)
    }

    async fn on_host_command(
        &mut self,
        action: &str,
        _param_names: &[String],
        _param_values: &[Value],
    ) -> Result<bool, PluginError> {
        if !action.eq_ignore_ascii_case(STATUS_REQUEST_COMMAND) {
            return Err(PluginError::UnknownCommand(action.to_string()));
        }
        let context = self.context.as_ref().ok_or(PluginError::NotInitialized)?;
        Ok(context
            .send_remote(MessageType::BACKLOG_STATUS, Bytes::new())
            .await)
    }

    fn stop(&mut self) {
        self.context = None;
    }
}

#[cfg(test)]
mod tests {
    use super::BacklogStatusPlugin;
    use crate::plugin::{DecodeStatus, FieldValue, Plugin, PluginError};
    use bytes::{BufMut, BytesMut};

    #[test]
    fn decodes_status_report() {
        let mut payload = BytesMut::new();
        payload.put_u32(3_600);
        payload.put_u32(12);
        payload.put_u64(4_096);
        payload.put_i64(1_700_000_000_000);

        let status = BacklogStatusPlugin::new().decode(5, &payload);

        assert_eq!(
            status,
            DecodeStatus::Processed {
                timestamp: Some(5),
                fields: vec![
                    FieldValue::BigInt(3_600),
                    FieldValue::BigInt(12),
                    FieldValue::BigInt(4_096),
                    FieldValue::BigInt(1_700_000_000_000),
                ],
            }
        );
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert!(matches!(
            BacklogStatusPlugin::new().decode(5, &[0u8; 10]),
            DecodeStatus::Rejected { .. }
        ));
    }

    #[tokio::test]
    async fn commands_require_initialization() {
        let mut plugin = BacklogStatusPlugin::new();

        assert_eq!(
            plugin.on_host_command("status_request", &[], &[]).await,
            Err(PluginError::NotInitialized)
        );
        assert_eq!(
            plugin.on_host_object(serde_json::json!({})).await,
            Err(PluginError::OperationNotSupported)
        );
    }
}
