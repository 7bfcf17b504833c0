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

mod support;

use backlog_broker::plugin::MigPacket;
use backlog_broker::relay::{LEGACY_HANDSHAKE, PLATFORM_HANDSHAKE};
use backlog_broker::{
    BrokerConfig, DeploymentId, DeploymentSettings, MessageType, PluginRegistry, WrapperState,
};
use integration_test_utils::{
    echo_plugin_id, registry_with_echo_plugins, FakeDeployment, RecordingSink,
    SerialForwarderTestClient,
};
use serde_json::json;
use std::sync::Arc;
use support::{QUIET, WAIT};

fn mig_payload(data: &[u8]) -> Vec<u8> {
    MigPacket {
        destination: 0xffff,
        source: 3,
        group_id: 0x22,
        am_type: 0x0a,
        data: data.to_vec(),
    }
    .encode()
    .expect("small packet encodes")
}

#[tokio::test]
async fn wrappers_on_one_deployment_share_the_relay() {
    integration_test_utils::init_logging();

    let deployment = FakeDeployment::start().await;
    let registry = support::make_registry(BrokerConfig::default());
    let settings = support::settings_for(
        "site1",
        DeploymentSettings::new(deployment.address()).with_relay_port(0),
    );
    let plugins = Arc::new(PluginRegistry::with_builtin());
    let sink = RecordingSink::new();

    let mut first = support::make_wrapper(
        "Site1_Motes",
        "mig",
        &registry,
        &settings,
        &plugins,
        Arc::new(sink.clone()),
    );
    let mut second = support::make_wrapper(
        "Site1_MotesBackup",
        "mig",
        &registry,
        &settings,
        &plugins,
        Arc::new(RecordingSink::new()),
    );
    support::assert_start_ok(&mut first).await;
    support::assert_start_ok(&mut second).await;

    let site1 = DeploymentId::new("site1");
    let relay_addr = first.relay_addr().expect("relay started");
    assert_eq!(second.relay_addr(), Some(relay_addr));
    assert_eq!(registry.relay_ref_count(&site1).await, 2);
    assert_eq!(registry.stats().relays_started, 1);

    let mut sf_client = SerialForwarderTestClient::connect(relay_addr, false)
        .await
        .expect("relay accepts serial-forwarder clients");
    assert_eq!(sf_client.server_handshake(), PLATFORM_HANDSHAKE);

    // Downlink: deployment packets fan out to relay clients and wrappers alike.
    let payload = mig_payload(&[0xbe, 0xef]);
    deployment.send_message(MessageType::MIG, 2_000, payload.clone());
    assert_eq!(sf_client.next_packet(WAIT).await, Some(payload));
    assert!(sink.wait_for_rows(1, WAIT).await);

    // Uplink: packets from relay clients reach the deployment as MIG messages.
    sf_client
        .send_packet(&[0x01, 0x02, 0x03])
        .await
        .expect("relay client write");
    let uplinked = deployment
        .next_message_of(MessageType::MIG, WAIT)
        .await
        .expect("relayed packet reaches the deployment");
    assert_eq!(&uplinked.payload[..], &[0x01, 0x02, 0x03]);

    support::assert_stop_ok(&mut first).await;
    assert_eq!(registry.relay_ref_count(&site1).await, 1);
    let payload = mig_payload(&[0x11]);
    deployment.send_message(MessageType::MIG, 2_001, payload.clone());
    assert_eq!(sf_client.next_packet(WAIT).await, Some(payload));

    support::assert_stop_ok(&mut second).await;
    assert_eq!(registry.stats().relays_stopped, 1);
    assert_eq!(sf_client.next_packet(QUIET).await, None);
}

#[tokio::test]
async fn legacy_relay_announces_its_platform() {
    integration_test_utils::init_logging();

    let deployment = FakeDeployment::start().await;
    let registry = support::make_registry(BrokerConfig::default());
    let settings = support::settings_for(
        "site2",
        DeploymentSettings::new(deployment.address())
            .with_relay_port(0)
            .with_legacy_platform(5),
    );
    let plugins = Arc::new(PluginRegistry::with_builtin());
    let mut wrapper = support::make_wrapper(
        "Site2_Motes",
        "mig",
        &registry,
        &settings,
        &plugins,
        Arc::new(RecordingSink::new()),
    );
    support::assert_start_ok(&mut wrapper).await;

    let relay_addr = wrapper.relay_addr().expect("relay started");
    let sf_client = SerialForwarderTestClient::connect(relay_addr, true)
        .await
        .expect("legacy handshake");
    let mut expected = LEGACY_HANDSHAKE.to_vec();
    expected.extend_from_slice(&5u32.to_le_bytes());
    assert_eq!(sf_client.server_handshake(), expected.as_slice());

    support::assert_stop_ok(&mut wrapper).await;
}

#[tokio::test]
async fn unusable_relay_port_leaves_the_decoder_running() {
    integration_test_utils::init_logging();

    let deployment = FakeDeployment::start().await;
    let registry = support::make_registry(BrokerConfig::default());
    let settings = support::settings_for(
        "site3",
        DeploymentSettings::new(deployment.address()).with_relay_port("not-a-port"),
    );
    let plugins = Arc::new(PluginRegistry::with_builtin());
    let sink = RecordingSink::new();
    let mut wrapper = support::make_wrapper(
        "Site3_Motes",
        "mig",
        &registry,
        &settings,
        &plugins,
        Arc::new(sink.clone()),
    );
    support::assert_start_ok(&mut wrapper).await;
    assert_eq!(wrapper.relay_addr(), None);

    deployment.send_message(MessageType::MIG, 3_000, mig_payload(&[0x42]));
    assert!(sink.wait_for_rows(1, WAIT).await);

    support::assert_stop_ok(&mut wrapper).await;
}

#[tokio::test]
async fn host_command_sends_a_mig_packet_to_the_deployment() {
    integration_test_utils::init_logging();

    let deployment = FakeDeployment::start().await;
    let registry = support::make_registry(BrokerConfig::default());
    let settings = support::settings_for("site4", DeploymentSettings::new(deployment.address()));
    let plugins = Arc::new(PluginRegistry::with_builtin());
    let mut wrapper = support::make_wrapper(
        "Site4_Motes",
        "mig",
        &registry,
        &settings,
        &plugins,
        Arc::new(RecordingSink::new()),
    );
    support::assert_start_ok(&mut wrapper).await;

    let names: Vec<String> = ["am_type", "destination", "data"]
        .iter()
        .map(|name| name.to_string())
        .collect();
    let values = vec![json!(10), json!("0xffff"), json!("beef")];
    assert!(wrapper
        .send_to_wrapper("send", &names, &values)
        .await
        .expect("send command is supported"));

    let sent = deployment
        .next_message_of(MessageType::MIG, WAIT)
        .await
        .expect("command reaches the deployment");
    let packet = MigPacket::parse(&sent.payload).expect("well-formed MIG packet");
    assert_eq!(packet.destination, 0xffff);
    assert_eq!(packet.source, 0);
    assert_eq!(packet.am_type, 10);
    assert_eq!(packet.data, vec![0xbe, 0xef]);

    support::assert_stop_ok(&mut wrapper).await;
    assert_eq!(wrapper.state(), WrapperState::Disposed);
    assert!(!wrapper.send_remote(vec![0x00]).await);
}

#[tokio::test]
async fn relayed_mig_messages_stay_in_the_backlog() {
    integration_test_utils::init_logging();

    let deployment = FakeDeployment::start().await;
    let registry = support::make_registry(BrokerConfig::default());
    let settings = support::settings_for(
        "site5",
        DeploymentSettings::new(deployment.address()).with_relay_port(0),
    );
    let (plugins, _) = registry_with_echo_plugins(&[MessageType(7)]);
    let plugins = Arc::new(plugins);
    let mut wrapper = support::make_wrapper(
        "Site5_Temperature",
        &echo_plugin_id(MessageType(7)),
        &registry,
        &settings,
        &plugins,
        Arc::new(RecordingSink::new()),
    );
    support::assert_start_ok(&mut wrapper).await;
    let relay_addr = wrapper.relay_addr().expect("relay started");

    // Only the relay listens for MIG, and nobody is attached to it.
    deployment.send_message(MessageType::MIG, 5_000, mig_payload(&[0x01]));
    assert!(deployment.no_ack_within(QUIET).await);

    // An attached relay client is still not a durable consumer.
    let mut sf_client = SerialForwarderTestClient::connect(relay_addr, false)
        .await
        .expect("relay accepts serial-forwarder clients");
    let payload = mig_payload(&[0x02]);
    deployment.send_message(MessageType::MIG, 5_001, payload.clone());
    assert_eq!(sf_client.next_packet(WAIT).await, Some(payload));
    assert!(deployment.no_ack_within(QUIET).await);

    deployment.send_message(MessageType(7), 5_002, vec![0x03]);
    let ack = deployment.next_ack(WAIT).await.expect("plugin message is acked");
    assert_eq!(ack.message_type, MessageType(7));
    assert_eq!(ack.timestamp, 5_002);

    support::assert_stop_ok(&mut wrapper).await;
}

#[tokio::test]
async fn relay_flavor_conflict_leaves_the_second_wrapper_without_relay() {
    integration_test_utils::init_logging();

    let deployment = FakeDeployment::start().await;
    let registry = support::make_registry(BrokerConfig::default());
    let platform_settings = support::settings_for(
        "site6",
        DeploymentSettings::new(deployment.address()).with_relay_port(0),
    );
    let legacy_settings = support::settings_for(
        "site6",
        DeploymentSettings::new(deployment.address())
            .with_relay_port(0)
            .with_legacy_platform(5),
    );
    let plugins = Arc::new(PluginRegistry::with_builtin());
    let sink = RecordingSink::new();

    let mut platform = support::make_wrapper(
        "Site6_Motes",
        "mig",
        &registry,
        &platform_settings,
        &plugins,
        Arc::new(RecordingSink::new()),
    );
    let mut legacy = support::make_wrapper(
        "Site6_LegacyMotes",
        "mig",
        &registry,
        &legacy_settings,
        &plugins,
        Arc::new(sink.clone()),
    );
    support::assert_start_ok(&mut platform).await;
    support::assert_start_ok(&mut legacy).await;

    let site6 = DeploymentId::new("site6");
    assert!(platform.relay_addr().is_some());
    assert_eq!(legacy.relay_addr(), None);
    assert_eq!(registry.relay_ref_count(&site6).await, 1);
    assert_eq!(registry.ref_count(&site6).await, 2);

    deployment.send_message(MessageType::MIG, 6_000, mig_payload(&[0x06]));
    assert!(sink.wait_for_rows(1, WAIT).await);

    support::assert_stop_ok(&mut legacy).await;
    assert_eq!(registry.relay_ref_count(&site6).await, 1);
    support::assert_stop_ok(&mut platform).await;
    assert_eq!(registry.stats().relays_stopped, 1);
}
