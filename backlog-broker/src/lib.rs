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

//! # backlog-broker
//!
//! `backlog-broker` shares one acknowledged TCP link per sensor deployment
//! between any number of consumers (virtual sensors) that start and stop on
//! their own schedules.
//!
//! Typical usage is centered on [`BacklogWrapper`]: one per virtual sensor,
//! all of them sharing one [`DeploymentRegistry`].
//!
//! ```
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use backlog_broker::{
//!     BacklogWrapper, BrokerConfig, DeploymentRegistry, DeploymentSettings, FieldValue,
//!     PluginRegistry, PublishSink, StaticDeploymentSettings, WrapperConfig, WrapperState,
//! };
//!
//! struct PrintSink;
//!
//! #[async_trait]
//! impl PublishSink for PrintSink {
//!     async fn publish(&self, timestamp: Option<i64>, fields: Vec<FieldValue>) -> bool {
//!         println!("{timestamp:?}: {fields:?}");
//!         true
//!     }
//! }
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let registry = Arc::new(DeploymentRegistry::new(BrokerConfig::default()));
//! let settings = Arc::new(
//!     StaticDeploymentSettings::new().with("site1", DeploymentSettings::new("127.0.0.1:1")),
//! );
//!
//! // No deployment listens on port 1: the start fails and nothing stays registered.
//! let mut wrapper = BacklogWrapper::new(
//!     WrapperConfig::new("Site1_Motes").with_plugin("mig"),
//!     registry.clone(),
//!     settings,
//!     Arc::new(PluginRegistry::with_builtin()),
//!     Arc::new(PrintSink),
//! );
//! assert!(wrapper.start().await.is_err());
//! assert_eq!(wrapper.state(), WrapperState::Uninitialized);
//! assert!(registry.active_deployments().await.is_empty());
//! # });
//! ```
//!
//! ## Internal architecture map
//!
//! - Codec: backlog frame layout and acknowledgment payloads
//! - Client: one link per deployment with listener dispatch, acks and reconnects
//! - Control plane: reference-counted ownership of clients and relays
//! - Relay: optional serial-forwarder fan-out of raw MIG packets
//! - Plugin: decoder contract, schema tables and built-in decoders
//! - Wrapper: per-consumer lifecycle tying the pieces together
//! - Runtime: background loop spawning and cancellation
//!
//! ## Observability model
//!
//! The workspace uses `tracing` for logs/events.
//! Library code emits events and does not initialize a global subscriber.
//! Binaries and tests are responsible for one-time `tracing_subscriber`
//! initialization at process boundaries.

mod client;
pub use client::{
    BackLogMessageListener, ClientError, ConnectionState, DeliveryOutcome, DeploymentClient,
};

pub mod codec;
pub mod config;
pub use config::{AckPolicy, BrokerConfig, ClientConfig, RelayConfig};

mod control_plane;
pub use control_plane::{DeploymentRegistry, RegistryError, RegistryStats, Released};

mod deployment;
pub use deployment::DeploymentId;

mod message;
pub use message::{current_timestamp_millis, BackLogMessage, MessageType};

#[doc(hidden)]
pub mod observability;

pub mod plugin;
pub use plugin::{
    DataField, DataType, DecodeStatus, FieldValue, Plugin, PluginContext, PluginError,
    PluginRegistry,
};

pub mod relay;
pub use relay::{RelayError, RelayFlavor, RelaySpec, SerialForwarderRelay};

mod runtime;

mod settings;
pub use settings::{
    DeploymentSettings, DeploymentSettingsSource, SettingsError, StaticDeploymentSettings,
};

mod sink;
pub use sink::PublishSink;

mod wrapper;
pub use wrapper::{
    BacklogWrapper, WrapperConfig, WrapperError, WrapperState, PLUGIN_PREDICATE, WRAPPER_NAME,
};
