//! Downstream contract for decoded rows.

use crate::plugin::FieldValue;
use async_trait::async_trait;

/// Receives decoded rows from a wrapper.
///
/// `false` means the row was not accepted. The broker does not retry; the
/// message stays unacknowledged and the deployment redelivers it after the
/// next reconnect.
#[async_trait]
pub trait PublishSink: Send + Sync {
    async fn publish(&self, timestamp: Option<i64>, fields: Vec<FieldValue>) -> bool;
}
