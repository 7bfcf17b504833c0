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

//! Serial-forwarder relay: rebroadcasts raw MIG packets of one deployment to
//! external serial-forwarder clients and forwards their packets back.

use super::error::RelayError;
use super::flavor::{RelayFlavor, RelaySpec};
use crate::client::{BackLogMessageListener, DeliveryOutcome, DeploymentClient};
use crate::config::RelayConfig;
use crate::deployment::DeploymentId;
use crate::message::{BackLogMessage, MessageType};
use crate::observability::{events, fields};
use crate::runtime::loop_runtime::{spawn_background_loop, BackgroundLoopHandle};
use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

const COMPONENT: &str = "serial_forwarder";

/// Largest payload expressible in the one-byte serial-forwarder length prefix.
pub const MAX_RELAY_PACKET_LEN: usize = u8::MAX as usize;

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Registered on the deployment client for MIG messages; feeds the fan-out queue.
/// Relay clients are best-effort, so the relay never vouches for an ack.
struct RelayListener {
    deployment: DeploymentId,
    packets: broadcast::Sender<Bytes>,
}

#[async_trait]
impl BackLogMessageListener for RelayListener {
    async fn message_received(&self, message: &BackLogMessage) -> DeliveryOutcome {
        if message.payload.len() > MAX_RELAY_PACKET_LEN {
            warn!(
                event = events::RELAY_PACKET_TOO_LARGE,
                component = COMPONENT,
                deployment = %self.deployment,
                payload_len = message.payload.len(),
                "packet too large for serial-forwarder framing; not relayed"
            );
        } else if self.packets.send(message.payload.clone()).is_err() {
            trace!(
                component = COMPONENT,
                deployment = %self.deployment,
                "no relay clients connected"
            );
        }
        DeliveryOutcome::Observed
    }
}

struct RelayShared {
    deployment: DeploymentId,
    flavor: RelayFlavor,
    handshake_timeout: Duration,
    packets: broadcast::Sender<Bytes>,
    uplink: Arc<DeploymentClient>,
    connected: AtomicUsize,
}

/// One listening relay socket per deployment.
pub struct SerialForwarderRelay {
    shared: Arc<RelayShared>,
    local_addr: SocketAddr,
    listener: Arc<dyn BackLogMessageListener>,
    accept_loop: Mutex<Option<BackgroundLoopHandle>>,
}

impl SerialForwarderRelay {
    /// Binds the relay port and attaches to `uplink` as a MIG listener.
    pub async fn start(
        deployment: DeploymentId,
        uplink: Arc<DeploymentClient>,
        spec: RelaySpec,
        config: &RelayConfig,
    ) -> Result<Self, RelayError> {
        let socket = TcpListener::bind(("0.0.0.0", spec.port))
            .await
            .map_err(|source| RelayError::Bind {
                port: spec.port,
                source,
            })?;
        let local_addr = socket.local_addr().map_err(|source| RelayError::Bind {
            port: spec.port,
            source,
        })?;

        let (packets, _) = broadcast::channel(config.queue_size.max(1));
        let listener: Arc<dyn BackLogMessageListener> = Arc::new(RelayListener {
            deployment: deployment.clone(),
            packets: packets.clone(),
        });
        uplink
            .register_listener(MessageType::MIG, listener.clone())
            .await
            .map_err(RelayError::Client)?;

        let shared = Arc::new(RelayShared {
            deployment,
            flavor: spec.flavor,
            handshake_timeout: config.handshake_timeout(),
            packets,
            uplink,
            connected: AtomicUsize::new(0),
        });

        let loop_shared = shared.clone();
        let accept_loop = spawn_background_loop(
            format!("serial-forwarder:{}", shared.deployment),
            CancellationToken::new(),
            move |cancel| run_accept_loop(socket, loop_shared, cancel),
        );

        info!(
            event = events::RELAY_LISTEN_OK,
            component = COMPONENT,
            deployment = %shared.deployment,
            port = local_addr.port(),
            flavor = %shared.flavor,
            "serial-forwarder relay listening"
        );

        Ok(Self {
            shared,
            local_addr,
            listener,
            accept_loop: Mutex::new(Some(accept_loop)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn flavor(&self) -> RelayFlavor {
        self.shared.flavor
    }

    pub fn deployment(&self) -> &DeploymentId {
        &self.shared.deployment
    }

    /// Relay clients that completed the handshake and are still attached.
    pub fn client_count(&self) -> usize {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Detaches from the deployment client and closes the listening socket
    /// together with every relay client. Idempotent.
    pub async fn stop(&self) {
        let Some(accept_loop) = self.accept_loop.lock().await.take() else {
            return;
        };
        self.shared
            .uplink
            .deregister_listener(MessageType::MIG, &self.listener)
            .await;
        accept_loop.shutdown().await;
        info!(
            event = events::RELAY_STOPPED,
            component = COMPONENT,
            deployment = %self.shared.deployment,
            port = self.local_addr.port(),
            "serial-forwarder relay stopped"
        );
    }
}

async fn run_accept_loop(socket: TcpListener, shared: Arc<RelayShared>, cancel: CancellationToken) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = socket.accept() => match accepted {
                Ok((stream, peer)) => {
                    connections.spawn(serve_relay_client(
                        stream,
                        peer,
                        shared.clone(),
                        cancel.clone(),
                    ));
                }
                Err(err) => {
                    warn!(
                        event = events::RELAY_ACCEPT_FAILED,
                        component = COMPONENT,
                        deployment = %shared.deployment,
                        err = %err,
                        "accept failed"
                    );
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    connections.shutdown().await;
}

async fn handshake(stream: &mut TcpStream, flavor: RelayFlavor) -> std::io::Result<()> {
    stream.write_all(&flavor.server_handshake()).await?;
    let mut prefix = [0u8; 2];
    stream.read_exact(&mut prefix).await?;
    if &prefix != flavor.expected_client_prefix() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unexpected serial-forwarder prefix {prefix:02x?}"),
        ));
    }
    Ok(())
}

/// Splits complete `[len][payload]` packets off the front of `buf`.
fn drain_packets(buf: &mut BytesMut) -> Vec<Bytes> {
    let mut packets = Vec::new();
    while let Some(&len) = buf.first() {
        let len = len as usize;
        if buf.len() < 1 + len {
            break;
        }
        buf.advance(1);
        let payload = buf.split_to(len).freeze();
        if !payload.is_empty() {
            packets.push(payload);
        }
    }
    packets
}

async fn serve_relay_client(
    mut stream: TcpStream,
    peer: SocketAddr,
    shared: Arc<RelayShared>,
    cancel: CancellationToken,
) {
    let client_id = Uuid::new_v4();
    let peer_label = fields::format_peer(Some(peer));
    // Subscribe before the handshake so packets relayed while it completes are kept.
    let mut packets = shared.packets.subscribe();

    match timeout(shared.handshake_timeout, handshake(&mut stream, shared.flavor)).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            warn!(
                event = events::RELAY_CLIENT_HANDSHAKE_FAILED,
                component = COMPONENT,
                deployment = %shared.deployment,
                peer = peer_label.as_str(),
                err = %err,
                "relay client handshake failed"
            );
            return;
        }
        Err(_) => {
            warn!(
                event = events::RELAY_CLIENT_HANDSHAKE_FAILED,
                component = COMPONENT,
                deployment = %shared.deployment,
                peer = peer_label.as_str(),
                reason = "timeout",
                "relay client handshake timed out"
            );
            return;
        }
    }

    shared.connected.fetch_add(1, Ordering::SeqCst);
    debug!(
        event = events::RELAY_CLIENT_ACCEPT,
        component = COMPONENT,
        deployment = %shared.deployment,
        client_id = %client_id,
        peer = peer_label.as_str(),
        "relay client attached"
    );

    let (mut reader, mut writer) = stream.into_split();
    let mut inbound = BytesMut::with_capacity(MAX_RELAY_PACKET_LEN + 1);
    let reason = loop {
        tokio::select! {
            _ = cancel.cancelled() => break fields::REASON_CANCELLED,
            packet = packets.recv() => match packet {
                Ok(payload) => {
                    let mut framed = Vec::with_capacity(payload.len() + 1);
                    framed.push(payload.len() as u8);
                    framed.extend_from_slice(&payload);
                    if writer.write_all(&framed).await.is_err() {
                        break "write_failed";
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        event = events::RELAY_CLIENT_LAGGED,
                        component = COMPONENT,
                        deployment = %shared.deployment,
                        client_id = %client_id,
                        skipped,
                        "relay client lagged; packets dropped"
                    );
                }
                Err(RecvError::Closed) => break fields::REASON_BROADCAST_CLOSED,
            },
            read = reader.read_buf(&mut inbound) => match read {
                Ok(0) => break fields::REASON_EOF,
                Ok(_) => {
                    for payload in drain_packets(&mut inbound) {
                        let message = BackLogMessage::now(MessageType::MIG, payload);
                        if let Err(err) = shared.uplink.send_message(&message).await {
                            warn!(
                                event = events::RELAY_UPLINK_FAILED,
                                component = COMPONENT,
                                deployment = %shared.deployment,
                                client_id = %client_id,
                                err = %err,
                                "unable to forward relay packet to deployment"
                            );
                        }
                    }
                }
                Err(_) => break "read_failed",
            },
        }
    };

    shared.connected.fetch_sub(1, Ordering::SeqCst);
    debug!(
        event = events::RELAY_CLIENT_CLOSED,
        component = COMPONENT,
        deployment = %shared.deployment,
        client_id = %client_id,
        reason,
        "relay client detached"
    );
}
