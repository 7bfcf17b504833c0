//! Host context handed to a plugin at initialization.

use crate::client::DeploymentClient;
use crate::deployment::DeploymentId;
use crate::message::{BackLogMessage, MessageType};
use bytes::Bytes;
use std::sync::{Arc, Mutex, PoisonError};

/// The plugin's view of its deployment.
///
/// The link is attached by the wrapper once the shared client has been
/// acquired and detached again before the client is released, so a plugin
/// never keeps a released client alive.
#[derive(Clone)]
pub struct PluginContext {
    deployment: DeploymentId,
    uplink: Arc<Mutex<Option<Arc<DeploymentClient>>>>,
}

impl PluginContext {
    pub fn new(deployment: DeploymentId) -> Self {
        Self {
            deployment,
            uplink: Arc::new(Mutex::new(None)),
        }
    }

    pub fn deployment(&self) -> &DeploymentId {
        &self.deployment
    }

    pub(crate) fn attach(&self, client: Arc<DeploymentClient>) {
        *self.uplink.lock().unwrap_or_else(PoisonError::into_inner) = Some(client);
    }

    pub(crate) fn detach(&self) {
        self.uplink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn client(&self) -> Option<Arc<DeploymentClient>> {
        self.uplink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_connected(&self) -> bool {
        self.client().is_some_and(|client| client.is_connected())
    }

    /// Sends `payload` as a `message_type` message stamped now. `false` when
    /// there is no working link.
    pub async fn send_remote(&self, message_type: MessageType, payload: impl Into<Bytes>) -> bool {
        let Some(client) = self.client() else {
            return false;
        };
        client
            .send_message(&BackLogMessage::now(message_type, payload))
            .await
            .is_ok()
    }
}
