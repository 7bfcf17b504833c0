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

use backlog_broker::codec::{encode_frame_to_bytes, Acknowledgment, FrameDecoder};
use backlog_broker::{BackLogMessage, MessageType};
use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::debug;

enum Command {
    Send(BackLogMessage),
    DropConnection,
}

/// Loopback TCP server speaking the deployment side of the backlog protocol.
///
/// Messages sent while no client is attached are queued and flushed to the
/// next connection. Frames from the client are split into acknowledgments
/// and everything else.
pub struct FakeDeployment {
    address: SocketAddr,
    commands: mpsc::UnboundedSender<Command>,
    acks: Mutex<mpsc::UnboundedReceiver<Acknowledgment>>,
    messages: Mutex<mpsc::UnboundedReceiver<BackLogMessage>>,
    connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl FakeDeployment {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("fake deployment should bind a loopback port");
        let address = listener
            .local_addr()
            .expect("fake deployment should have a local address");
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (ack_tx, acks) = mpsc::unbounded_channel();
        let (message_tx, messages) = mpsc::unbounded_channel();
        let connections = Arc::new(AtomicUsize::new(0));

        let task = tokio::spawn(serve(
            listener,
            command_rx,
            ack_tx,
            message_tx,
            connections.clone(),
        ));

        Self {
            address,
            commands,
            acks: Mutex::new(acks),
            messages: Mutex::new(messages),
            connections,
            task,
        }
    }

    pub fn address(&self) -> String {
        self.address.to_string()
    }

    pub fn send(&self, message: BackLogMessage) {
        self.commands
            .send(Command::Send(message))
            .expect("fake deployment task should be running");
    }

    pub fn send_message(&self, message_type: MessageType, timestamp: i64, payload: impl Into<Bytes>) {
        self.send(BackLogMessage::new(message_type, timestamp, payload));
    }

    /// Closes the current client connection; the listener keeps accepting.
    pub fn drop_connection(&self) {
        self.commands
            .send(Command::DropConnection)
            .expect("fake deployment task should be running");
    }

    /// Connections accepted so far.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub async fn wait_for_connections(&self, count: usize, within: Duration) -> bool {
        let deadline = Instant::now() + within;
        while Instant::now() < deadline {
            if self.connection_count() >= count {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }
        self.connection_count() >= count
    }

    pub async fn next_ack(&self, within: Duration) -> Option<Acknowledgment> {
        timeout(within, self.acks.lock().await.recv())
            .await
            .ok()
            .flatten()
    }

    /// Non-ack frames sent by the client (pings, relayed packets, commands).
    pub async fn next_message(&self, within: Duration) -> Option<BackLogMessage> {
        timeout(within, self.messages.lock().await.recv())
            .await
            .ok()
            .flatten()
    }

    /// Next non-ack frame of `message_type`, skipping others.
    pub async fn next_message_of(
        &self,
        message_type: MessageType,
        within: Duration,
    ) -> Option<BackLogMessage> {
        let deadline = Instant::now() + within;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let message = self.next_message(remaining).await?;
            if message.message_type == message_type {
                return Some(message);
            }
        }
    }

    /// `true` when no ack arrives within `within`.
    pub async fn no_ack_within(&self, within: Duration) -> bool {
        self.next_ack(within).await.is_none()
    }
}

impl Drop for FakeDeployment {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn write_message(writer: &mut OwnedWriteHalf, message: &BackLogMessage) -> std::io::Result<()> {
    let frame = encode_frame_to_bytes(message)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    writer.write_all(&frame).await
}

async fn serve(
    listener: TcpListener,
    mut commands: mpsc::UnboundedReceiver<Command>,
    acks: mpsc::UnboundedSender<Acknowledgment>,
    messages: mpsc::UnboundedSender<BackLogMessage>,
    connections: Arc<AtomicUsize>,
) {
    let mut pending: VecDeque<BackLogMessage> = VecDeque::new();

    loop {
        let stream = loop {
            tokio::select! {
                accepted = listener.accept() => {
                    if let Ok((stream, _)) = accepted {
                        break stream;
                    }
                }
                command = commands.recv() => match command {
                    None => return,
                    Some(Command::Send(message)) => pending.push_back(message),
                    Some(Command::DropConnection) => {}
                },
            }
        };
        connections.fetch_add(1, Ordering::SeqCst);
        debug!(pending = pending.len(), "fake deployment accepted a client");

        let (mut reader, mut writer) = stream.into_split();
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::new();

        let mut flushed = true;
        while let Some(message) = pending.pop_front() {
            if write_message(&mut writer, &message).await.is_err() {
                pending.push_front(message);
                flushed = false;
                break;
            }
        }
        if !flushed {
            continue;
        }

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    None => return,
                    Some(Command::Send(message)) => {
                        if write_message(&mut writer, &message).await.is_err() {
                            pending.push_back(message);
                            break;
                        }
                    }
                    Some(Command::DropConnection) => break,
                },
                read = reader.read_buf(&mut buf) => match read {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        while let Ok(Some(message)) = decoder.decode(&mut buf) {
                            match Acknowledgment::from_message(&message) {
                                Some(ack) => {
                                    let _ = acks.send(ack);
                                }
                                None => {
                                    let _ = messages.send(message);
                                }
                            }
                        }
                    }
                },
            }
        }
        debug!("fake deployment closed its client connection");
    }
}
