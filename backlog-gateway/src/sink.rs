use async_trait::async_trait;
use backlog_broker::{FieldValue, PublishSink};
use tracing::info;

/// Publishes rows as structured log events.
pub(crate) struct TracingSink {
    virtual_sensor: String,
}

impl TracingSink {
    pub(crate) fn new(virtual_sensor: impl Into<String>) -> Self {
        Self {
            virtual_sensor: virtual_sensor.into(),
        }
    }
}

#[async_trait]
impl PublishSink for TracingSink {
    async fn publish(&self, timestamp: Option<i64>, fields: Vec<FieldValue>) -> bool {
        match serde_json::to_string(&fields) {
            Ok(row) => {
                info!(
                    component = "backlog_gateway",
                    wrapper = self.virtual_sensor.as_str(),
                    timestamp = ?timestamp,
                    row = row.as_str(),
                    "row published"
                );
                true
            }
            Err(_) => false,
        }
    }
}
