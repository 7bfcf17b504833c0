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

//! Reference-counted ownership of deployment clients and relays.
//!
//! Each deployment has one slot guarded by its own lock; the outer map lock is
//! only held to look up, insert or remove slots and never across I/O. Acquire
//! and release on one deployment are serialized by the slot lock while other
//! deployments proceed independently.
//!
//! A slot is *retired* when its last holder leaves or its first connect
//! fails. Callers that raced onto a retired slot retry against a fresh one, so
//! a half-built or torn-down entry is never handed out.

use crate::client::{ClientError, DeploymentClient};
use crate::config::BrokerConfig;
use crate::deployment::DeploymentId;
use crate::observability::events;
use crate::relay::{RelayError, RelaySpec, SerialForwarderRelay};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

const COMPONENT: &str = "deployment_registry";

#[derive(Debug)]
pub enum RegistryError {
    Connect {
        deployment: DeploymentId,
        source: ClientError,
    },
    /// More releases than acquires for this deployment.
    ReleaseUnderflow(DeploymentId),
    /// More relay releases than relay acquires for this deployment.
    RelayReleaseUnderflow(DeploymentId),
    /// A relay was requested for a deployment whose client is not held.
    NotAcquired(DeploymentId),
    Relay(RelayError),
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::Connect { deployment, source } => {
                write!(f, "unable to create client for deployment {deployment}: {source}")
            }
            RegistryError::ReleaseUnderflow(deployment) => {
                write!(f, "client for deployment {deployment} released more often than acquired")
            }
            RegistryError::RelayReleaseUnderflow(deployment) => {
                write!(f, "relay for deployment {deployment} released more often than acquired")
            }
            RegistryError::NotAcquired(deployment) => {
                write!(f, "no client is held for deployment {deployment}")
            }
            RegistryError::Relay(err) => write!(f, "relay unavailable: {err}"),
        }
    }
}

impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RegistryError::Connect { source, .. } => Some(source),
            RegistryError::Relay(err) => Some(err),
            _ => None,
        }
    }
}

/// Result of a release.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Released {
    Retained { remaining: usize },
    /// The caller was the last holder; the shared resource has been shut down.
    TornDown,
}

/// Lifetime counters, mainly for tests and health output.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RegistryStats {
    pub clients_created: usize,
    pub clients_torn_down: usize,
    pub relays_started: usize,
    pub relays_stopped: usize,
}

#[derive(Default)]
struct RegistryCounters {
    clients_created: AtomicUsize,
    clients_torn_down: AtomicUsize,
    relays_started: AtomicUsize,
    relays_stopped: AtomicUsize,
}

struct RelayBinding {
    relay: Arc<SerialForwarderRelay>,
    ref_count: usize,
}

#[derive(Default)]
struct SlotState {
    retired: bool,
    client: Option<Arc<DeploymentClient>>,
    ref_count: usize,
    relay: Option<RelayBinding>,
}

#[derive(Default)]
struct DeploymentSlot {
    state: Mutex<SlotState>,
}

pub struct DeploymentRegistry {
    config: BrokerConfig,
    slots: Mutex<HashMap<DeploymentId, Arc<DeploymentSlot>>>,
    counters: RegistryCounters,
}

impl DeploymentRegistry {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            slots: Mutex::new(HashMap::new()),
            counters: RegistryCounters::default(),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    async fn slot_or_insert(&self, deployment: &DeploymentId) -> Arc<DeploymentSlot> {
        self.slots
            .lock()
            .await
            .entry(deployment.clone())
            .or_default()
            .clone()
    }

    async fn existing_slot(&self, deployment: &DeploymentId) -> Option<Arc<DeploymentSlot>> {
        self.slots.lock().await.get(deployment).cloned()
    }

    async fn remove_slot(&self, deployment: &DeploymentId, slot: &Arc<DeploymentSlot>) {
        let mut slots = self.slots.lock().await;
        if slots
            .get(deployment)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
        {
            slots.remove(deployment);
        }
    }

    /// Returns the shared client for `deployment`, connecting to `address`
    /// when none exists. The flag is `true` when this call created it.
    ///
    /// An existing client is reused even if `address` differs from the one it
    /// was created with.
    pub async fn acquire_client(
        &self,
        deployment: &DeploymentId,
        address: &str,
    ) -> Result<(Arc<DeploymentClient>, bool), RegistryError> {
        loop {
            let slot = self.slot_or_insert(deployment).await;
            let mut state = slot.state.lock().await;
            if state.retired {
                drop(state);
                tokio::task::yield_now().await;
                continue;
            }

            if let Some(client) = state.client.clone() {
                state.ref_count += 1;
                if client.address() != address {
                    debug!(
                        component = COMPONENT,
                        deployment = %deployment,
                        address,
                        shared_address = client.address(),
                        "reusing client created for another address"
                    );
                }
                info!(
                    event = events::REGISTRY_CLIENT_REUSE,
                    component = COMPONENT,
                    deployment = %deployment,
                    ref_count = state.ref_count,
                    "reusing deployment client"
                );
                return Ok((client, false));
            }

            let created = match DeploymentClient::connect(
                deployment.clone(),
                address,
                self.config.client.clone(),
            )
            .await
            {
                Ok(client) => {
                    let client = Arc::new(client);
                    match client.start().await {
                        Ok(()) => Ok(client),
                        Err(err) => {
                            client.shutdown().await;
                            Err(err)
                        }
                    }
                }
                Err(err) => Err(err),
            };

            return match created {
                Ok(client) => {
                    state.client = Some(client.clone());
                    state.ref_count = 1;
                    self.counters.clients_created.fetch_add(1, Ordering::SeqCst);
                    info!(
                        event = events::REGISTRY_CLIENT_CREATE,
                        component = COMPONENT,
                        deployment = %deployment,
                        address,
                        "deployment client created"
                    );
                    Ok((client, true))
                }
                Err(source) => {
                    state.retired = true;
                    drop(state);
                    self.remove_slot(deployment, &slot).await;
                    Err(RegistryError::Connect {
                        deployment: deployment.clone(),
                        source,
                    })
                }
            };
        }
    }

    /// Drops one hold on the client of `deployment`. The last release stops
    /// any relay still attached, shuts the client down and removes the entry.
    pub async fn release_client(&self, deployment: &DeploymentId) -> Result<Released, RegistryError> {
        let Some(slot) = self.existing_slot(deployment).await else {
            return Err(self.underflow(deployment, false));
        };
        let mut state = slot.state.lock().await;
        if state.retired || state.ref_count == 0 {
            return Err(self.underflow(deployment, false));
        }

        state.ref_count -= 1;
        if state.ref_count > 0 {
            debug!(
                event = events::REGISTRY_CLIENT_RELEASE,
                component = COMPONENT,
                deployment = %deployment,
                ref_count = state.ref_count,
                "deployment client released; still shared"
            );
            return Ok(Released::Retained {
                remaining: state.ref_count,
            });
        }

        if let Some(binding) = state.relay.take() {
            binding.relay.stop().await;
            self.counters.relays_stopped.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(client) = state.client.take() {
            client.shutdown().await;
            self.counters.clients_torn_down.fetch_add(1, Ordering::SeqCst);
        }
        state.retired = true;
        drop(state);
        self.remove_slot(deployment, &slot).await;

        info!(
            event = events::REGISTRY_CLIENT_TEARDOWN,
            component = COMPONENT,
            deployment = %deployment,
            "last holder left; deployment client torn down"
        );
        Ok(Released::TornDown)
    }

    /// Returns the relay of `deployment`, starting it on first use. The
    /// caller must hold the deployment's client.
    ///
    /// A running relay is reused when the flavor matches; a different port is
    /// only logged.
    pub async fn acquire_relay(
        &self,
        deployment: &DeploymentId,
        spec: RelaySpec,
    ) -> Result<Arc<SerialForwarderRelay>, RegistryError> {
        let Some(slot) = self.existing_slot(deployment).await else {
            return Err(RegistryError::NotAcquired(deployment.clone()));
        };
        let mut state = slot.state.lock().await;
        let client = match (&state.client, state.retired) {
            (Some(client), false) => client.clone(),
            _ => return Err(RegistryError::NotAcquired(deployment.clone())),
        };

        if let Some(binding) = state.relay.as_mut() {
            let existing = binding.relay.flavor();
            if existing != spec.flavor {
                return Err(RegistryError::Relay(RelayError::FlavorMismatch {
                    existing,
                    requested: spec.flavor,
                }));
            }
            let bound_port = binding.relay.local_addr().port();
            if spec.port != 0 && spec.port != bound_port {
                warn!(
                    component = COMPONENT,
                    deployment = %deployment,
                    port = spec.port,
                    bound_port,
                    "relay already listening on another port; reusing it"
                );
            }
            binding.ref_count += 1;
            debug!(
                event = events::REGISTRY_RELAY_REUSE,
                component = COMPONENT,
                deployment = %deployment,
                ref_count = binding.ref_count,
                "reusing relay"
            );
            return Ok(binding.relay.clone());
        }

        let relay = SerialForwarderRelay::start(deployment.clone(), client, spec, &self.config.relay)
            .await
            .map_err(RegistryError::Relay)?;
        let relay = Arc::new(relay);
        state.relay = Some(RelayBinding {
            relay: relay.clone(),
            ref_count: 1,
        });
        self.counters.relays_started.fetch_add(1, Ordering::SeqCst);
        info!(
            event = events::REGISTRY_RELAY_START,
            component = COMPONENT,
            deployment = %deployment,
            port = relay.local_addr().port(),
            "relay started"
        );
        Ok(relay)
    }

    pub async fn release_relay(&self, deployment: &DeploymentId) -> Result<Released, RegistryError> {
        let Some(slot) = self.existing_slot(deployment).await else {
            return Err(self.underflow(deployment, true));
        };
        let mut state = slot.state.lock().await;
        let Some(binding) = state.relay.as_mut() else {
            return Err(self.underflow(deployment, true));
        };

        binding.ref_count -= 1;
        if binding.ref_count > 0 {
            return Ok(Released::Retained {
                remaining: binding.ref_count,
            });
        }

        if let Some(binding) = state.relay.take() {
            binding.relay.stop().await;
            self.counters.relays_stopped.fetch_add(1, Ordering::SeqCst);
        }
        info!(
            event = events::REGISTRY_RELAY_STOP,
            component = COMPONENT,
            deployment = %deployment,
            "last relay holder left; relay stopped"
        );
        Ok(Released::TornDown)
    }

    fn underflow(&self, deployment: &DeploymentId, relay: bool) -> RegistryError {
        error!(
            event = events::REGISTRY_RELEASE_UNDERFLOW,
            component = COMPONENT,
            deployment = %deployment,
            relay,
            "release without matching acquire"
        );
        if relay {
            RegistryError::RelayReleaseUnderflow(deployment.clone())
        } else {
            RegistryError::ReleaseUnderflow(deployment.clone())
        }
    }

    /// Current holders of the client of `deployment`; `0` when absent.
    pub async fn ref_count(&self, deployment: &DeploymentId) -> usize {
        match self.existing_slot(deployment).await {
            Some(slot) => {
                let state = slot.state.lock().await;
                if state.retired {
                    0
                } else {
                    state.ref_count
                }
            }
            None => 0,
        }
    }

    pub async fn relay_ref_count(&self, deployment: &DeploymentId) -> usize {
        match self.existing_slot(deployment).await {
            Some(slot) => slot
                .state
                .lock()
                .await
                .relay
                .as_ref()
                .map_or(0, |binding| binding.ref_count),
            None => 0,
        }
    }

    pub async fn client(&self, deployment: &DeploymentId) -> Option<Arc<DeploymentClient>> {
        let slot = self.existing_slot(deployment).await?;
        let state = slot.state.lock().await;
        if state.retired {
            return None;
        }
        state.client.clone()
    }

    /// Deployments that currently have a live client, sorted.
    pub async fn active_deployments(&self) -> Vec<DeploymentId> {
        let slots: Vec<(DeploymentId, Arc<DeploymentSlot>)> = self
            .slots
            .lock()
            .await
            .iter()
            .map(|(deployment, slot)| (deployment.clone(), slot.clone()))
            .collect();

        let mut active = Vec::with_capacity(slots.len());
        for (deployment, slot) in slots {
            let state = slot.state.lock().await;
            if !state.retired && state.client.is_some() {
                active.push(deployment);
            }
        }
        active.sort();
        active
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            clients_created: self.counters.clients_created.load(Ordering::SeqCst),
            clients_torn_down: self.counters.clients_torn_down.load(Ordering::SeqCst),
            relays_started: self.counters.relays_started.load(Ordering::SeqCst),
            relays_stopped: self.counters.relays_stopped.load(Ordering::SeqCst),
        }
    }
}
