use backlog_broker::{
    DataField, DataType, DecodeStatus, FieldValue, MessageType, Plugin, PluginContext,
    PluginError, PluginRegistry,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// First payload byte that makes [`EchoPlugin`] reject a message.
pub const GARBAGE_MARKER: u8 = 0xFF;

pub const ECHO_PLUGIN_PREFIX: &str = "echo-";

/// Decoder double for an arbitrary message type.
///
/// Publishes the payload as one binary column. Empty payloads and payloads
/// starting with [`GARBAGE_MARKER`] are rejected.
pub struct EchoPlugin {
    message_type: MessageType,
    decoded: Arc<AtomicUsize>,
    context: Option<PluginContext>,
}

impl EchoPlugin {
    pub fn new(message_type: MessageType, decoded: Arc<AtomicUsize>) -> Self {
        Self {
            message_type,
            decoded,
            context: None,
        }
    }
}

impl Plugin for EchoPlugin {
    fn initialize(&mut self, context: PluginContext) -> Result<(), PluginError> {
        self.context = Some(context);
        Ok(())
    }

    fn message_type(&self) -> MessageType {
        self.message_type
    }

    fn decode(&mut self, _timestamp: i64, payload: &[u8]) -> DecodeStatus {
        self.decoded.fetch_add(1, Ordering::SeqCst);
        match payload.first() {
            None => DecodeStatus::rejected("empty payload"),
            Some(&GARBAGE_MARKER) => DecodeStatus::rejected("garbage marker"),
            Some(_) => DecodeStatus::Processed {
                timestamp: None,
                fields: vec![FieldValue::Binary(payload.to_vec())],
            },
        }
    }

    fn output_schema(&self) -> Vec<DataField> {
        vec![DataField::new("payload", DataType::Binary, "raw payload")]
    }

    fn stop(&mut self) {
        self.context = None;
    }
}

/// Plugin identifier for an [`EchoPlugin`] bound to `message_type`.
pub fn echo_plugin_id(message_type: MessageType) -> String {
    format!("{ECHO_PLUGIN_PREFIX}{}", message_type.as_u8())
}

/// Built-in plugins plus one echo plugin per type in `types`, all sharing
/// the returned decode counter.
pub fn registry_with_echo_plugins(types: &[MessageType]) -> (PluginRegistry, Arc<AtomicUsize>) {
    let decoded = Arc::new(AtomicUsize::new(0));
    let mut registry = PluginRegistry::with_builtin();
    for &message_type in types {
        let counter = decoded.clone();
        registry.register(echo_plugin_id(message_type), move || {
            Box::new(EchoPlugin::new(message_type, counter.clone()))
        });
    }
    (registry, decoded)
}
