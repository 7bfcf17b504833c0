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

//! Tuning knobs for clients and relays. Loaded by the process boundary, the
//! library only consumes the resulting values.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// When a dispatched message is acknowledged to the deployment.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum AckPolicy {
    /// Ack only when every listener processed the message. Rejected payloads
    /// stay in the deployment backlog and are redelivered after reconnects.
    #[default]
    ProcessedOnly,
    /// Ack rejected payloads as well; only publish failures withhold the ack.
    IncludeRejected,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct ClientConfig {
    pub connect_timeout_ms: u64,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    pub idle_timeout_ms: u64,
    pub ack_policy: AckPolicy,
    pub dedupe_window: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            reconnect_initial_ms: 1_000,
            reconnect_max_ms: 30_000,
            idle_timeout_ms: 60_000,
            ack_policy: AckPolicy::default(),
            dedupe_window: 1_024,
        }
    }
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_ms.max(1))
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms.max(self.reconnect_initial_ms).max(1))
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms.max(1))
    }

    /// Doubles `current`, capped at [`reconnect_max`](Self::reconnect_max).
    pub fn next_backoff(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.reconnect_max())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct RelayConfig {
    pub queue_size: usize,
    pub handshake_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            queue_size: 256,
            handshake_timeout_ms: 5_000,
        }
    }
}

impl RelayConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms.max(1))
    }
}

/// Everything a [`DeploymentRegistry`](crate::DeploymentRegistry) needs to
/// build shared resources.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields, default)]
pub struct BrokerConfig {
    pub client: ClientConfig,
    pub relay: RelayConfig,
}
