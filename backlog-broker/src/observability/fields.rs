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

//! Canonical structured field keys and value-format helpers.

use crate::message::BackLogMessage;
use std::net::SocketAddr;

pub const EVENT: &str = "event";
pub const COMPONENT: &str = "component";
pub const DEPLOYMENT: &str = "deployment";
pub const ADDRESS: &str = "address";
pub const WRAPPER: &str = "wrapper";
pub const LOOP_NAME: &str = "loop_name";

pub const MSG_TYPE: &str = "msg_type";
pub const TIMESTAMP: &str = "timestamp";
pub const PAYLOAD_LEN: &str = "payload_len";

pub const REF_COUNT: &str = "ref_count";
pub const LISTENERS: &str = "listeners";
pub const SKIPPED: &str = "skipped";
pub const REASON: &str = "reason";
pub const ERR: &str = "err";
pub const PEER: &str = "peer";
pub const PORT: &str = "port";

pub const NONE: &str = "none";
pub const REASON_CANCELLED: &str = "cancelled";
pub const REASON_EOF: &str = "eof";
pub const REASON_IDLE_TIMEOUT: &str = "idle_timeout";
pub const REASON_BROADCAST_CLOSED: &str = "broadcast_closed";

/// Compact one-line summary used for debug events on the data path.
pub fn format_message(message: &BackLogMessage) -> String {
    format!(
        "{}@{} ({} bytes)",
        message.message_type,
        message.timestamp,
        message.payload.len()
    )
}

pub fn format_peer(peer: Option<SocketAddr>) -> String {
    peer.map(|addr| addr.to_string())
        .unwrap_or_else(|| NONE.to_string())
}

/// Hex rendering of small payloads; long payloads are truncated.
pub fn format_payload_preview(payload: &[u8], max_bytes: usize) -> String {
    let mut rendered: String = payload
        .iter()
        .take(max_bytes)
        .map(|byte| format!("{byte:02x}"))
        .collect();
    if payload.len() > max_bytes {
        rendered.push_str("..");
    }
    rendered
}
