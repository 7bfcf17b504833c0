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

//! Decoder contract for one message kind, and the built-in decoders.
//!
//! Plugins are selected by identifier through a [`PluginRegistry`] and are
//! owned exclusively by one wrapper. They hold no shared state beyond what
//! they receive in [`Plugin::initialize`].

mod backlog_status;
mod context;
mod error;
mod mig;
mod params;
mod registry;
mod schema;

pub use backlog_status::{BacklogStatusPlugin, BACKLOG_STATUS_PLUGIN_ID};
pub use context::PluginContext;
pub use error::PluginError;
pub use mig::{MigPacket, MigPlugin, MIG_HEADER_LEN, MIG_PLUGIN_ID};
pub use params::{bytes_param, command_param, integer_param, u16_param, u8_param};
pub use registry::{PluginFactory, PluginRegistry};
pub use schema::{extract_row, schema_of, DataField, DataType, FieldSpec, FieldValue};

use crate::message::MessageType;
use async_trait::async_trait;
use serde_json::Value;

/// Result of decoding one payload.
#[derive(Clone, Debug, PartialEq)]
pub enum DecodeStatus {
    /// `timestamp` overrides the message timestamp for the published row when set.
    Processed {
        timestamp: Option<i64>,
        fields: Vec<FieldValue>,
    },
    Rejected { reason: String },
}

impl DecodeStatus {
    pub fn rejected(reason: impl Into<String>) -> Self {
        DecodeStatus::Rejected {
            reason: reason.into(),
        }
    }
}

#[async_trait]
pub trait Plugin: Send {
    /// Called once before any other method.
    fn initialize(&mut self, context: PluginContext) -> Result<(), PluginError>;

    fn message_type(&self) -> MessageType;

    /// Must not panic on malformed input; report it as [`DecodeStatus::Rejected`].
    fn decode(&mut self, timestamp: i64, payload: &[u8]) -> DecodeStatus;

    fn output_schema(&self) -> Vec<DataField>;

    async fn on_host_command(
        &mut self,
        _action: &str,
        _param_names: &[String],
        _param_values: &[Value],
    ) -> Result<bool, PluginError> {
        Err(PluginError::OperationNotSupported)
    }

    async fn on_host_object(&mut self, _object: Value) -> Result<bool, PluginError> {
        Err(PluginError::OperationNotSupported)
    }

    /// Releases whatever `initialize` acquired.
    fn stop(&mut self) {}
}
