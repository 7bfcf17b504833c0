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

//! Consumer-facing controller: attaches one virtual sensor to its deployment.
//!
//! Starting a wrapper resolves its deployment and plugin, takes a hold on the
//! shared client (and relay, when configured) through the
//! [`DeploymentRegistry`] and registers a listener that decodes with the
//! plugin and publishes to the sink. Stopping undoes each step in reverse.

use crate::client::{BackLogMessageListener, ClientError, DeliveryOutcome, DeploymentClient};
use crate::control_plane::{DeploymentRegistry, RegistryError};
use crate::deployment::DeploymentId;
use crate::message::{BackLogMessage, MessageType};
use crate::observability::events;
use crate::plugin::{DataField, DecodeStatus, Plugin, PluginContext, PluginError, PluginRegistry};
use crate::relay::SerialForwarderRelay;
use crate::settings::{DeploymentSettingsSource, SettingsError};
use crate::sink::PublishSink;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

const COMPONENT: &str = "backlog_wrapper";

pub const WRAPPER_NAME: &str = "BackLogWrapper";
/// Predicate naming the plugin identifier.
pub const PLUGIN_PREDICATE: &str = "plugin-classname";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WrapperState {
    Uninitialized,
    Initializing,
    Active,
    Disposing,
    Disposed,
}

impl Display for WrapperState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WrapperState::Uninitialized => "uninitialized",
            WrapperState::Initializing => "initializing",
            WrapperState::Active => "active",
            WrapperState::Disposing => "disposing",
            WrapperState::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// Per-consumer configuration.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct WrapperConfig {
    pub virtual_sensor_name: String,
    #[serde(default)]
    pub predicates: BTreeMap<String, String>,
}

impl WrapperConfig {
    pub fn new(virtual_sensor_name: impl Into<String>) -> Self {
        Self {
            virtual_sensor_name: virtual_sensor_name.into(),
            predicates: BTreeMap::new(),
        }
    }

    pub fn with_predicate(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.predicates.insert(key.into(), value.into());
        self
    }

    pub fn with_plugin(self, plugin_id: impl Into<String>) -> Self {
        self.with_predicate(PLUGIN_PREDICATE, plugin_id)
    }

    pub fn plugin_id(&self) -> Option<&str> {
        self.predicates
            .get(PLUGIN_PREDICATE)
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug)]
pub enum WrapperError {
    InvalidState {
        expected: WrapperState,
        actual: WrapperState,
    },
    /// No deployment prefix in the virtual-sensor name.
    MissingDeployment(String),
    MissingPlugin,
    Settings(SettingsError),
    Plugin(PluginError),
    Registry(RegistryError),
    Client(ClientError),
}

impl Display for WrapperError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            WrapperError::InvalidState { expected, actual } => {
                write!(f, "wrapper is {actual}, expected {expected}")
            }
            WrapperError::MissingDeployment(name) => {
                write!(f, "virtual sensor name {name:?} does not name a deployment")
            }
            WrapperError::MissingPlugin => {
                write!(f, "predicate {PLUGIN_PREDICATE:?} is not configured")
            }
            WrapperError::Settings(err) => write!(f, "deployment settings: {err}"),
            WrapperError::Plugin(err) => write!(f, "plugin: {err}"),
            WrapperError::Registry(err) => write!(f, "registry: {err}"),
            WrapperError::Client(err) => write!(f, "client: {err}"),
        }
    }
}

impl Error for WrapperError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WrapperError::Settings(err) => Some(err),
            WrapperError::Plugin(err) => Some(err),
            WrapperError::Registry(err) => Some(err),
            WrapperError::Client(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PluginError> for WrapperError {
    fn from(err: PluginError) -> Self {
        WrapperError::Plugin(err)
    }
}

/// Decodes with the wrapper's plugin and publishes to its sink.
struct WrapperListener {
    virtual_sensor: String,
    deployment: DeploymentId,
    plugin: Arc<Mutex<Box<dyn Plugin>>>,
    sink: Arc<dyn PublishSink>,
    active: AtomicBool,
}

#[async_trait]
impl BackLogMessageListener for WrapperListener {
    async fn message_received(&self, message: &BackLogMessage) -> DeliveryOutcome {
        if !self.active.load(Ordering::SeqCst) {
            error!(
                event = events::WRAPPER_DELIVERY_AFTER_STOP,
                component = COMPONENT,
                wrapper = self.virtual_sensor.as_str(),
                deployment = %self.deployment,
                msg_type = %message.message_type,
                "delivery to a stopped wrapper"
            );
            return DeliveryOutcome::Observed;
        }

        let status = self
            .plugin
            .lock()
            .await
            .decode(message.timestamp, &message.payload);

        match status {
            DecodeStatus::Processed { timestamp, fields } => {
                let timestamp = timestamp.or(Some(message.timestamp));
                if self.sink.publish(timestamp, fields).await {
                    DeliveryOutcome::Processed
                } else {
                    warn!(
                        event = events::WRAPPER_PUBLISH_FAILED,
                        component = COMPONENT,
                        wrapper = self.virtual_sensor.as_str(),
                        deployment = %self.deployment,
                        timestamp = message.timestamp,
                        "sink refused decoded row"
                    );
                    DeliveryOutcome::PublishFailed
                }
            }
            DecodeStatus::Rejected { reason } => {
                warn!(
                    event = events::WRAPPER_DECODE_REJECTED,
                    component = COMPONENT,
                    wrapper = self.virtual_sensor.as_str(),
                    deployment = %self.deployment,
                    msg_type = %message.message_type,
                    timestamp = message.timestamp,
                    reason = reason.as_str(),
                    "plugin rejected payload"
                );
                DeliveryOutcome::Rejected
            }
        }
    }
}

struct Attachment {
    deployment: DeploymentId,
    message_type: MessageType,
    plugin: Arc<Mutex<Box<dyn Plugin>>>,
    context: PluginContext,
    client: Arc<DeploymentClient>,
    listener: Arc<WrapperListener>,
    relay: Option<Arc<SerialForwarderRelay>>,
}

impl Attachment {
    fn listener_handle(&self) -> Arc<dyn BackLogMessageListener> {
        self.listener.clone()
    }
}

pub struct BacklogWrapper {
    config: WrapperConfig,
    registry: Arc<DeploymentRegistry>,
    settings: Arc<dyn DeploymentSettingsSource>,
    plugins: Arc<PluginRegistry>,
    sink: Arc<dyn PublishSink>,
    state: WrapperState,
    attachment: Option<Attachment>,
}

impl BacklogWrapper {
    pub fn new(
        config: WrapperConfig,
        registry: Arc<DeploymentRegistry>,
        settings: Arc<dyn DeploymentSettingsSource>,
        plugins: Arc<PluginRegistry>,
        sink: Arc<dyn PublishSink>,
    ) -> Self {
        Self {
            config,
            registry,
            settings,
            plugins,
            sink,
            state: WrapperState::Uninitialized,
            attachment: None,
        }
    }

    pub fn wrapper_name(&self) -> &'static str {
        WRAPPER_NAME
    }

    /// Deployments may emit several rows with one timestamp.
    pub fn is_timestamp_unique(&self) -> bool {
        false
    }

    pub fn state(&self) -> WrapperState {
        self.state
    }

    pub fn virtual_sensor_name(&self) -> &str {
        &self.config.virtual_sensor_name
    }

    pub fn deployment(&self) -> Option<&DeploymentId> {
        self.attachment.as_ref().map(|attachment| &attachment.deployment)
    }

    pub fn relay_addr(&self) -> Option<SocketAddr> {
        self.attachment
            .as_ref()
            .and_then(|attachment| attachment.relay.as_ref())
            .map(|relay| relay.local_addr())
    }

    fn expect_state(&self, expected: WrapperState) -> Result<(), WrapperError> {
        if self.state != expected {
            return Err(WrapperError::InvalidState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    fn active_attachment(&self) -> Result<&Attachment, WrapperError> {
        self.expect_state(WrapperState::Active)?;
        self.attachment.as_ref().ok_or(WrapperError::InvalidState {
            expected: WrapperState::Active,
            actual: self.state,
        })
    }

    /// Attaches to the deployment. On failure nothing stays registered and
    /// the wrapper returns to `Uninitialized`.
    pub async fn start(&mut self) -> Result<(), WrapperError> {
        self.expect_state(WrapperState::Uninitialized)?;
        self.state = WrapperState::Initializing;
        info!(
            event = events::WRAPPER_START,
            component = COMPONENT,
            wrapper = self.config.virtual_sensor_name.as_str(),
            "starting wrapper"
        );

        match self.attach().await {
            Ok(attachment) => {
                info!(
                    event = events::WRAPPER_START_OK,
                    component = COMPONENT,
                    wrapper = self.config.virtual_sensor_name.as_str(),
                    deployment = %attachment.deployment,
                    msg_type = %attachment.message_type,
                    "wrapper active"
                );
                self.attachment = Some(attachment);
                self.state = WrapperState::Active;
                Ok(())
            }
            Err(err) => {
                warn!(
                    event = events::WRAPPER_START_FAILED,
                    component = COMPONENT,
                    wrapper = self.config.virtual_sensor_name.as_str(),
                    err = %err,
                    "wrapper failed to start"
                );
                self.state = WrapperState::Uninitialized;
                Err(err)
            }
        }
    }

    async fn attach(&self) -> Result<Attachment, WrapperError> {
        let name = &self.config.virtual_sensor_name;
        let deployment = DeploymentId::from_virtual_sensor_name(name)
            .ok_or_else(|| WrapperError::MissingDeployment(name.clone()))?;
        let plugin_id = self.config.plugin_id().ok_or(WrapperError::MissingPlugin)?;
        let settings = self
            .settings
            .deployment_settings(&deployment)
            .map_err(WrapperError::Settings)?;

        let mut plugin = self.plugins.instantiate(plugin_id)?;
        let context = PluginContext::new(deployment.clone());
        plugin.initialize(context.clone())?;
        let message_type = plugin.message_type();

        let client = match self
            .registry
            .acquire_client(&deployment, &settings.address)
            .await
        {
            Ok((client, _)) => client,
            Err(err) => {
                plugin.stop();
                return Err(WrapperError::Registry(err));
            }
        };
        context.attach(client.clone());

        let plugin = Arc::new(Mutex::new(plugin));
        let listener = Arc::new(WrapperListener {
            virtual_sensor: name.clone(),
            deployment: deployment.clone(),
            plugin: plugin.clone(),
            sink: self.sink.clone(),
            active: AtomicBool::new(true),
        });
        if let Err(err) = client
            .register_listener(message_type, listener.clone())
            .await
        {
            context.detach();
            if let Err(release_err) = self.registry.release_client(&deployment).await {
                error!(
                    component = COMPONENT,
                    wrapper = name.as_str(),
                    deployment = %deployment,
                    err = %release_err,
                    "unable to roll back client hold"
                );
            }
            plugin.lock().await.stop();
            return Err(WrapperError::Client(err));
        }

        let relay = match settings.relay_spec() {
            None => None,
            Some(Err(err)) => {
                warn!(
                    event = events::WRAPPER_RELAY_UNAVAILABLE,
                    component = COMPONENT,
                    wrapper = name.as_str(),
                    deployment = %deployment,
                    err = %err,
                    "relay settings invalid; continuing without relay"
                );
                None
            }
            Some(Ok(spec)) => match self.registry.acquire_relay(&deployment, spec).await {
                Ok(relay) => Some(relay),
                Err(err) => {
                    warn!(
                        event = events::WRAPPER_RELAY_UNAVAILABLE,
                        component = COMPONENT,
                        wrapper = name.as_str(),
                        deployment = %deployment,
                        err = %err,
                        "relay unavailable; continuing without relay"
                    );
                    None
                }
            },
        };

        Ok(Attachment {
            deployment,
            message_type,
            plugin,
            context,
            client,
            listener,
            relay,
        })
    }

    /// Detaches from the deployment. The wrapper ends `Disposed` even when a
    /// release fails; the first such failure is returned.
    pub async fn stop(&mut self) -> Result<(), WrapperError> {
        self.expect_state(WrapperState::Active)?;
        let Some(attachment) = self.attachment.take() else {
            return Err(WrapperError::InvalidState {
                expected: WrapperState::Active,
                actual: self.state,
            });
        };
        self.state = WrapperState::Disposing;
        info!(
            event = events::WRAPPER_STOP,
            component = COMPONENT,
            wrapper = self.config.virtual_sensor_name.as_str(),
            deployment = %attachment.deployment,
            "stopping wrapper"
        );

        attachment
            .client
            .deregister_listener(attachment.message_type, &attachment.listener_handle())
            .await;
        attachment.listener.active.store(false, Ordering::SeqCst);
        attachment.context.detach();

        let mut outcome = Ok(());
        if attachment.relay.is_some() {
            if let Err(err) = self.registry.release_relay(&attachment.deployment).await {
                outcome = Err(WrapperError::Registry(err));
            }
        }
        drop(attachment.relay);
        match self.registry.release_client(&attachment.deployment).await {
            Ok(released) => debug!(
                component = COMPONENT,
                wrapper = self.config.virtual_sensor_name.as_str(),
                deployment = %attachment.deployment,
                released = ?released,
                "client hold released"
            ),
            Err(err) => {
                if outcome.is_ok() {
                    outcome = Err(WrapperError::Registry(err));
                }
            }
        }
        attachment.plugin.lock().await.stop();

        self.state = WrapperState::Disposed;
        info!(
            event = events::WRAPPER_STOP_OK,
            component = COMPONENT,
            wrapper = self.config.virtual_sensor_name.as_str(),
            deployment = %attachment.deployment,
            "wrapper disposed"
        );
        outcome
    }

    /// Sends `payload` to the deployment as a message of the plugin's type.
    pub async fn send_remote(&self, payload: impl Into<Bytes>) -> bool {
        match self.active_attachment() {
            Ok(attachment) => {
                attachment
                    .context
                    .send_remote(attachment.message_type, payload)
                    .await
            }
            Err(_) => false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.attachment
            .as_ref()
            .is_some_and(|attachment| attachment.client.is_connected())
    }

    /// Empty until the wrapper is active.
    pub async fn output_schema(&self) -> Vec<DataField> {
        match &self.attachment {
            Some(attachment) => attachment.plugin.lock().await.output_schema(),
            None => Vec::new(),
        }
    }

    pub async fn send_to_wrapper(
        &self,
        action: &str,
        param_names: &[String],
        param_values: &[Value],
    ) -> Result<bool, WrapperError> {
        let attachment = self.active_attachment()?;
        let mut plugin = attachment.plugin.lock().await;
        Ok(plugin
            .on_host_command(action, param_names, param_values)
            .await?)
    }

    pub async fn send_object(&self, object: Value) -> Result<bool, WrapperError> {
        let attachment = self.active_attachment()?;
        let mut plugin = attachment.plugin.lock().await;
        Ok(plugin.on_host_object(object).await?)
    }
}

impl Drop for BacklogWrapper {
    fn drop(&mut self) {
        let Some(attachment) = self.attachment.as_ref() else {
            return;
        };
        // Releasing needs the async registry; the holds stay until process exit.
        attachment.listener.active.store(false, Ordering::SeqCst);
        attachment.context.detach();
        error!(
            event = events::WRAPPER_DROPPED_ACTIVE,
            component = COMPONENT,
            wrapper = self.config.virtual_sensor_name.as_str(),
            deployment = %attachment.deployment,
            state = %self.state,
            "wrapper dropped without stop(); deployment client and listener stay held"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::{BacklogWrapper, WrapperConfig, WrapperError, WrapperState, WRAPPER_NAME};
    use crate::config::BrokerConfig;
    use crate::control_plane::DeploymentRegistry;
    use crate::plugin::{FieldValue, PluginError, PluginRegistry};
    use crate::settings::{DeploymentSettings, StaticDeploymentSettings};
    use crate::sink::PublishSink;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct DiscardSink;

    #[async_trait]
    impl PublishSink for DiscardSink {
        async fn publish(&self, _timestamp: Option<i64>, _fields: Vec<FieldValue>) -> bool {
            true
        }
    }

    fn wrapper(config: WrapperConfig, settings: StaticDeploymentSettings) -> BacklogWrapper {
        BacklogWrapper::new(
            config,
            Arc::new(DeploymentRegistry::new(BrokerConfig::default())),
            Arc::new(settings),
            Arc::new(PluginRegistry::with_builtin()),
            Arc::new(DiscardSink),
        )
    }

    #[test]
    fn plugin_identifier_comes_from_predicate() {
        let config = WrapperConfig::new("site1_mig").with_plugin(" mig ");

        assert_eq!(config.plugin_id(), Some("mig"));
        assert_eq!(WrapperConfig::new("site1_mig").plugin_id(), None);
    }

    #[tokio::test]
    async fn configuration_errors_leave_wrapper_uninitialized() {
        let mut missing_plugin = wrapper(
            WrapperConfig::new("site1_mig"),
            StaticDeploymentSettings::new(),
        );
        assert!(matches!(
            missing_plugin.start().await,
            Err(WrapperError::MissingPlugin)
        ));
        assert_eq!(missing_plugin.state(), WrapperState::Uninitialized);

        let mut missing_settings = wrapper(
            WrapperConfig::new("site1_mig").with_plugin("mig"),
            StaticDeploymentSettings::new(),
        );
        assert!(matches!(
            missing_settings.start().await,
            Err(WrapperError::Settings(_))
        ));

        let mut unknown_plugin = wrapper(
            WrapperConfig::new("site1_mig").with_plugin("unknown-decoder"),
            StaticDeploymentSettings::new().with("site1", DeploymentSettings::new("127.0.0.1:1")),
        );
        assert!(matches!(
            unknown_plugin.start().await,
            Err(WrapperError::Plugin(PluginError::UnknownPlugin(_)))
        ));
        assert_eq!(unknown_plugin.state(), WrapperState::Uninitialized);
    }

    #[tokio::test]
    async fn inactive_wrapper_refuses_stop_and_commands() {
        let mut idle = wrapper(
            WrapperConfig::new("site1_mig").with_plugin("mig"),
            StaticDeploymentSettings::new(),
        );

        assert!(matches!(
            idle.stop().await,
            Err(WrapperError::InvalidState {
                expected: WrapperState::Active,
                actual: WrapperState::Uninitialized
            })
        ));
        assert!(matches!(
            idle.send_to_wrapper("send", &[], &[]).await,
            Err(WrapperError::InvalidState { .. })
        ));
        assert!(!idle.send_remote(vec![1u8]).await);
        assert!(idle.output_schema().await.is_empty());
        assert_eq!(idle.wrapper_name(), WRAPPER_NAME);
        assert!(!idle.is_timestamp_unique());
    }
}
