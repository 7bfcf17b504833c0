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

//! Listener contract and the per-type listener table of a deployment client.

use crate::config::AckPolicy;
use crate::message::{BackLogMessage, MessageType};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// What a listener did with one delivered message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeliveryOutcome {
    /// Decoded and handed off downstream.
    Processed,
    /// The payload was malformed for this listener and was dropped.
    Rejected,
    /// Decoded, but the downstream sink refused the data.
    PublishFailed,
    /// Seen without taking responsibility for it; never counts toward an ack.
    Observed,
}

/// Receives every message of the types it is registered for.
///
/// Implementations must not call back into the client's listener table from
/// `message_received`; the table is read-locked while a message is delivered.
#[async_trait]
pub trait BackLogMessageListener: Send + Sync {
    async fn message_received(&self, message: &BackLogMessage) -> DeliveryOutcome;
}

/// Decides whether the deployment may drop a message from its backlog.
pub(crate) fn should_acknowledge(policy: AckPolicy, outcomes: &[DeliveryOutcome]) -> bool {
    let mut consumers = outcomes
        .iter()
        .filter(|outcome| **outcome != DeliveryOutcome::Observed)
        .peekable();
    if consumers.peek().is_none() {
        return false;
    }
    match policy {
        AckPolicy::ProcessedOnly => {
            consumers.all(|outcome| *outcome == DeliveryOutcome::Processed)
        }
        AckPolicy::IncludeRejected => {
            consumers.all(|outcome| *outcome != DeliveryOutcome::PublishFailed)
        }
    }
}

/// Listener identity is the allocation, not the value.
fn same_listener(a: &Arc<dyn BackLogMessageListener>, b: &Arc<dyn BackLogMessageListener>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

#[derive(Default)]
pub(crate) struct ListenerTable {
    listeners: HashMap<MessageType, Vec<Arc<dyn BackLogMessageListener>>>,
}

impl ListenerTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when `listener` was already registered for `message_type`.
    pub(crate) fn register(
        &mut self,
        message_type: MessageType,
        listener: Arc<dyn BackLogMessageListener>,
    ) -> bool {
        let slot = self.listeners.entry(message_type).or_default();
        if slot.iter().any(|existing| same_listener(existing, &listener)) {
            return false;
        }
        slot.push(listener);
        true
    }

    /// Returns `false` when `listener` was not registered for `message_type`.
    pub(crate) fn deregister(
        &mut self,
        message_type: MessageType,
        listener: &Arc<dyn BackLogMessageListener>,
    ) -> bool {
        let Some(slot) = self.listeners.get_mut(&message_type) else {
            return false;
        };
        let before = slot.len();
        slot.retain(|existing| !same_listener(existing, listener));
        let removed = slot.len() != before;
        if slot.is_empty() {
            self.listeners.remove(&message_type);
        }
        removed
    }

    pub(crate) fn listeners_for(
        &self,
        message_type: MessageType,
    ) -> Option<&[Arc<dyn BackLogMessageListener>]> {
        self.listeners
            .get(&message_type)
            .map(Vec::as_slice)
            .filter(|listeners| !listeners.is_empty())
    }

    pub(crate) fn count(&self, message_type: MessageType) -> usize {
        self.listeners.get(&message_type).map_or(0, Vec::len)
    }

    pub(crate) fn registered_types(&self) -> Vec<MessageType> {
        let mut types: Vec<MessageType> = self.listeners.keys().copied().collect();
        types.sort();
        types
    }
}
