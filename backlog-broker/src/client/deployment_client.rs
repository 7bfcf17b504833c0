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

//! One persistent TCP link to a deployment.
//!
//! The client owns the socket, a background receive loop and the listener
//! table. Messages are dispatched to every listener registered for their type
//! and acknowledged only after the listeners have finished with them, so the
//! deployment keeps anything that was not consumed in its backlog.

use super::dedupe::DedupeWindow;
use super::error::ClientError;
use super::listener::{should_acknowledge, BackLogMessageListener, ListenerTable};
use crate::codec::{encode_frame_to_bytes, Acknowledgment, FrameDecoder, FrameError};
use crate::config::ClientConfig;
use crate::deployment::DeploymentId;
use crate::message::{BackLogMessage, MessageType};
use crate::observability::{events, fields};
use crate::runtime::loop_runtime::{spawn_background_loop, BackgroundLoopHandle};
use bytes::{Bytes, BytesMut};
use futures::future::join_all;
use std::fmt::{Display, Formatter};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

const COMPONENT: &str = "deployment_client";
const READ_BUFFER_CAPACITY: usize = 8 * 1024;

/// Link state as observed by users of the client.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionState {
    Connected,
    /// The link dropped; the receive loop is backing off between attempts.
    Reconnecting,
    Closed,
}

enum DisconnectReason {
    Cancelled,
    Eof,
    IdleTimeout,
    Io(io::Error),
    Protocol(FrameError),
}

impl Display for DisconnectReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::Cancelled => f.write_str(fields::REASON_CANCELLED),
            DisconnectReason::Eof => f.write_str(fields::REASON_EOF),
            DisconnectReason::IdleTimeout => f.write_str(fields::REASON_IDLE_TIMEOUT),
            DisconnectReason::Io(err) => write!(f, "io: {err}"),
            DisconnectReason::Protocol(err) => write!(f, "protocol: {err}"),
        }
    }
}

struct ClientInner {
    deployment: DeploymentId,
    address: String,
    config: ClientConfig,
    listeners: RwLock<ListenerTable>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    state: watch::Sender<ConnectionState>,
    closed: AtomicBool,
}

/// Shared link to one deployment; see the module docs.
pub struct DeploymentClient {
    inner: Arc<ClientInner>,
    pending_reader: Mutex<Option<OwnedReadHalf>>,
    receive_loop: Mutex<Option<BackgroundLoopHandle>>,
}

async fn open_stream(address: &str, connect_timeout: Duration) -> Result<TcpStream, ClientError> {
    match timeout(connect_timeout, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => {
            if let Err(err) = stream.set_nodelay(true) {
                debug!(component = COMPONENT, address, err = %err, "unable to set TCP_NODELAY");
            }
            Ok(stream)
        }
        Ok(Err(source)) => Err(ClientError::Connect {
            address: address.to_string(),
            source,
        }),
        Err(_) => Err(ClientError::ConnectTimeout {
            address: address.to_string(),
        }),
    }
}

impl DeploymentClient {
    /// Opens the link. The receive loop does not run until [`start`](Self::start).
    pub async fn connect(
        deployment: DeploymentId,
        address: impl Into<String>,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        let address = address.into();
        let stream = match open_stream(&address, config.connect_timeout()).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(
                    event = events::CLIENT_CONNECT_FAILED,
                    component = COMPONENT,
                    deployment = %deployment,
                    address = address.as_str(),
                    err = %err,
                    "unable to connect to deployment"
                );
                return Err(err);
            }
        };
        let (read_half, write_half) = stream.into_split();
        let (state, _) = watch::channel(ConnectionState::Connected);

        info!(
            event = events::CLIENT_CONNECT_OK,
            component = COMPONENT,
            deployment = %deployment,
            address = address.as_str(),
            "connected to deployment"
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                deployment,
                address,
                config,
                listeners: RwLock::new(ListenerTable::new()),
                writer: Mutex::new(Some(write_half)),
                state,
                closed: AtomicBool::new(false),
            }),
            pending_reader: Mutex::new(Some(read_half)),
            receive_loop: Mutex::new(None),
        })
    }

    /// Starts the receive loop. Calling it again is a no-op.
    pub async fn start(&self) -> Result<(), ClientError> {
        self.ensure_open()?;
        let mut receive_loop = self.receive_loop.lock().await;
        if receive_loop.is_some() {
            return Ok(());
        }

        let reader = self.pending_reader.lock().await.take();
        let inner = self.inner.clone();
        let loop_name = format!("deployment-client:{}", self.inner.deployment);
        *receive_loop = Some(spawn_background_loop(
            loop_name,
            CancellationToken::new(),
            move |cancel| run_receive_loop(inner, reader, cancel),
        ));
        Ok(())
    }

    /// Stops the receive loop and closes the socket. Idempotent.
    ///
    /// A dispatch already in progress finishes before this returns.
    pub async fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let handle = self.receive_loop.lock().await.take();
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
        self.pending_reader.lock().await.take();
        self.inner.writer.lock().await.take();
        self.inner.state.send_replace(ConnectionState::Closed);
    }

    pub fn deployment(&self) -> &DeploymentId {
        &self.inner.deployment
    }

    pub fn address(&self) -> &str {
        &self.inner.address
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Waits up to `within` for the link to reach `wanted`.
    pub async fn wait_for_state(&self, wanted: ConnectionState, within: Duration) -> bool {
        let mut state = self.inner.state.subscribe();
        timeout(within, state.wait_for(|current| *current == wanted))
            .await
            .map(|reached| reached.is_ok())
            .unwrap_or(false)
    }

    /// Adds `listener` for `message_type`. Returns `Ok(false)` when it was
    /// already registered for that type.
    pub async fn register_listener(
        &self,
        message_type: MessageType,
        listener: Arc<dyn BackLogMessageListener>,
    ) -> Result<bool, ClientError> {
        self.ensure_open()?;
        let mut listeners = self.inner.listeners.write().await;
        let added = listeners.register(message_type, listener);
        debug!(
            event = events::LISTENER_REGISTER,
            component = COMPONENT,
            deployment = %self.inner.deployment,
            msg_type = %message_type,
            added,
            listeners = listeners.count(message_type),
            "listener registration"
        );
        Ok(added)
    }

    /// Removes `listener` for `message_type`.
    ///
    /// Waits for any in-flight delivery to finish, so once this returns the
    /// listener receives nothing more from this client.
    pub async fn deregister_listener(
        &self,
        message_type: MessageType,
        listener: &Arc<dyn BackLogMessageListener>,
    ) -> bool {
        let mut listeners = self.inner.listeners.write().await;
        let removed = listeners.deregister(message_type, listener);
        debug!(
            event = events::LISTENER_DEREGISTER,
            component = COMPONENT,
            deployment = %self.inner.deployment,
            msg_type = %message_type,
            removed,
            listeners = listeners.count(message_type),
            "listener deregistration"
        );
        removed
    }

    pub async fn listener_count(&self, message_type: MessageType) -> usize {
        self.inner.listeners.read().await.count(message_type)
    }

    pub async fn registered_types(&self) -> Vec<MessageType> {
        self.inner.listeners.read().await.registered_types()
    }

    /// Writes one framed message to the deployment.
    pub async fn send_message(&self, message: &BackLogMessage) -> Result<(), ClientError> {
        self.ensure_open()?;
        self.inner.send(message).await
    }

    pub async fn send_ack(&self, message_type: MessageType, timestamp: i64) -> Result<(), ClientError> {
        self.ensure_open()?;
        self.inner.send_ack(message_type, timestamp).await
    }

    fn ensure_open(&self) -> Result<(), ClientError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ClientError::Closed);
        }
        Ok(())
    }
}

impl ClientInner {
    /// Also used by the receive loop while shutdown drains the last dispatch,
    /// hence no `closed` check here.
    async fn send(&self, message: &BackLogMessage) -> Result<(), ClientError> {
        let frame = encode_frame_to_bytes(message)?;
        let mut writer = self.writer.lock().await;
        let Some(write_half) = writer.as_mut() else {
            return Err(ClientError::NotConnected);
        };
        if let Err(err) = write_half.write_all(&frame).await {
            writer.take();
            warn!(
                event = events::CLIENT_SEND_FAILED,
                component = COMPONENT,
                deployment = %self.deployment,
                msg_type = %message.message_type,
                err = %err,
                "write to deployment failed"
            );
            return Err(ClientError::Io(err));
        }
        Ok(())
    }

    async fn send_ack(&self, message_type: MessageType, timestamp: i64) -> Result<(), ClientError> {
        self.send(&Acknowledgment::new(message_type, timestamp).to_message())
            .await
    }

    async fn handle_inbound(&self, message: BackLogMessage, dedupe: &mut DedupeWindow) {
        match message.message_type {
            MessageType::PING => {
                let pong = BackLogMessage::new(MessageType::PING_ACK, message.timestamp, Bytes::new());
                if let Err(err) = self.send(&pong).await {
                    debug!(
                        component = COMPONENT,
                        deployment = %self.deployment,
                        err = %err,
                        "unable to answer ping"
                    );
                }
            }
            MessageType::PING_ACK => {
                trace!(component = COMPONENT, deployment = %self.deployment, "ping answered");
            }
            message_type if message_type.is_control() => {
                warn!(
                    event = events::DISPATCH_UNEXPECTED_CONTROL,
                    component = COMPONENT,
                    deployment = %self.deployment,
                    msg_type = %message_type,
                    "ignoring control message from deployment"
                );
            }
            _ => self.dispatch(message, dedupe).await,
        }
    }

    async fn dispatch(&self, message: BackLogMessage, dedupe: &mut DedupeWindow) {
        let message_type = message.message_type;
        let timestamp = message.timestamp;
        debug!(
            event = events::DISPATCH_RECEIVE,
            component = COMPONENT,
            deployment = %self.deployment,
            summary = fields::format_message(&message).as_str(),
            "message received"
        );

        if dedupe.is_duplicate(message_type, timestamp) {
            debug!(
                event = events::DISPATCH_DUPLICATE,
                component = COMPONENT,
                deployment = %self.deployment,
                msg_type = %message_type,
                timestamp,
                "redelivered message already consumed, re-acknowledging"
            );
            self.acknowledge(message_type, timestamp).await;
            return;
        }

        let outcomes = {
            let listeners = self.listeners.read().await;
            let Some(targets) = listeners.listeners_for(message_type) else {
                debug!(
                    event = events::DISPATCH_NO_LISTENER,
                    component = COMPONENT,
                    deployment = %self.deployment,
                    msg_type = %message_type,
                    timestamp,
                    payload = fields::format_payload_preview(&message.payload, 16).as_str(),
                    "no listener for message type; left in deployment backlog"
                );
                return;
            };
            join_all(
                targets
                    .iter()
                    .map(|listener| listener.message_received(&message)),
            )
            .await
        };

        if should_acknowledge(self.config.ack_policy, &outcomes) {
            dedupe.record(message_type, timestamp);
            self.acknowledge(message_type, timestamp).await;
        } else {
            debug!(
                event = events::ACK_WITHHELD,
                component = COMPONENT,
                deployment = %self.deployment,
                msg_type = %message_type,
                timestamp,
                outcomes = ?outcomes,
                "message not consumed; ack withheld"
            );
        }
    }

    async fn acknowledge(&self, message_type: MessageType, timestamp: i64) {
        match self.send_ack(message_type, timestamp).await {
            Ok(()) => trace!(
                event = events::ACK_SENT,
                component = COMPONENT,
                deployment = %self.deployment,
                msg_type = %message_type,
                timestamp,
                "ack sent"
            ),
            Err(err) => warn!(
                event = events::ACK_SEND_FAILED,
                component = COMPONENT,
                deployment = %self.deployment,
                msg_type = %message_type,
                timestamp,
                err = %err,
                "unable to acknowledge message"
            ),
        }
    }

    async fn read_frames(
        &self,
        mut reader: OwnedReadHalf,
        dedupe: &mut DedupeWindow,
        cancel: &CancellationToken,
    ) -> DisconnectReason {
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::with_capacity(READ_BUFFER_CAPACITY);
        let mut ping_outstanding = false;

        loop {
            loop {
                match decoder.decode(&mut buf) {
                    Ok(Some(message)) => self.handle_inbound(message, dedupe).await,
                    Ok(None) => break,
                    Err(err) => return DisconnectReason::Protocol(err),
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return DisconnectReason::Cancelled,
                read = timeout(self.config.idle_timeout(), reader.read_buf(&mut buf)) => match read {
                    Ok(Ok(0)) => return DisconnectReason::Eof,
                    Ok(Ok(_)) => ping_outstanding = false,
                    Ok(Err(err)) => return DisconnectReason::Io(err),
                    Err(_) if ping_outstanding => return DisconnectReason::IdleTimeout,
                    Err(_) => {
                        ping_outstanding = true;
                        debug!(
                            event = events::CLIENT_IDLE_PING,
                            component = COMPONENT,
                            deployment = %self.deployment,
                            "link idle; probing deployment"
                        );
                        let ping = BackLogMessage::now(MessageType::PING, Bytes::new());
                        if let Err(ClientError::Io(err)) = self.send(&ping).await {
                            return DisconnectReason::Io(err);
                        }
                    }
                }
            }
        }
    }

    async fn reconnect(
        &self,
        cancel: &CancellationToken,
        backoff: &mut Duration,
    ) -> Option<OwnedReadHalf> {
        loop {
            debug!(
                event = events::CLIENT_RECONNECT_SCHEDULED,
                component = COMPONENT,
                deployment = %self.deployment,
                delay_ms = backoff.as_millis() as u64,
                "reconnect scheduled"
            );
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = sleep(*backoff) => {}
            }

            let attempt = tokio::select! {
                _ = cancel.cancelled() => return None,
                attempt = open_stream(&self.address, self.config.connect_timeout()) => attempt,
            };
            match attempt {
                Ok(stream) => {
                    let (read_half, write_half) = stream.into_split();
                    *self.writer.lock().await = Some(write_half);
                    self.state.send_replace(ConnectionState::Connected);
                    *backoff = self.config.reconnect_initial();
                    info!(
                        event = events::CLIENT_CONNECT_OK,
                        component = COMPONENT,
                        deployment = %self.deployment,
                        address = self.address.as_str(),
                        "reconnected to deployment"
                    );
                    return Some(read_half);
                }
                Err(err) => {
                    warn!(
                        event = events::CLIENT_CONNECT_FAILED,
                        component = COMPONENT,
                        deployment = %self.deployment,
                        address = self.address.as_str(),
                        err = %err,
                        "reconnect attempt failed"
                    );
                    *backoff = self.config.next_backoff(*backoff);
                }
            }
        }
    }
}

async fn run_receive_loop(
    inner: Arc<ClientInner>,
    mut reader: Option<OwnedReadHalf>,
    cancel: CancellationToken,
) {
    let mut dedupe = DedupeWindow::new(inner.config.dedupe_window);
    let mut backoff = inner.config.reconnect_initial();

    loop {
        let read_half = match reader.take() {
            Some(read_half) => read_half,
            None => match inner.reconnect(&cancel, &mut backoff).await {
                Some(read_half) => read_half,
                None => break,
            },
        };

        let reason = inner.read_frames(read_half, &mut dedupe, &cancel).await;
        inner.writer.lock().await.take();
        if matches!(reason, DisconnectReason::Cancelled) {
            break;
        }

        inner.state.send_replace(ConnectionState::Reconnecting);
        warn!(
            event = events::CLIENT_CONNECTION_LOST,
            component = COMPONENT,
            deployment = %inner.deployment,
            reason = %reason,
            "lost link to deployment"
        );
    }

    inner.state.send_replace(ConnectionState::Closed);
    info!(
        event = events::CLIENT_LOOP_STOPPED,
        component = COMPONENT,
        deployment = %inner.deployment,
        "receive loop stopped"
    );
}
