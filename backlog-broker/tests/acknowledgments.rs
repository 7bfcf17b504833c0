mod support;

use backlog_broker::{AckPolicy, BrokerConfig, DeploymentSettings, MessageType};
use integration_test_utils::{
    echo_plugin_id, registry_with_echo_plugins, FakeDeployment, RecordingSink, GARBAGE_MARKER,
};
use std::sync::Arc;
use support::{QUIET, WAIT};

const TYPE_A: MessageType = MessageType(7);
const TYPE_B: MessageType = MessageType(9);

struct Harness {
    deployment: FakeDeployment,
    sink_a: RecordingSink,
    sink_b: RecordingSink,
    wrappers: Vec<backlog_broker::BacklogWrapper>,
}

async fn start_harness(config: BrokerConfig, sink_a: RecordingSink) -> Harness {
    integration_test_utils::init_logging();

    let deployment = FakeDeployment::start().await;
    let registry = support::make_registry(config);
    let settings = support::settings_for("site1", DeploymentSettings::new(deployment.address()));
    let (plugins, _) = registry_with_echo_plugins(&[TYPE_A, TYPE_B]);
    let plugins = Arc::new(plugins);
    let sink_b = RecordingSink::new();

    let mut wrapper_a = support::make_wrapper(
        "Site1_Alpha",
        &echo_plugin_id(TYPE_A),
        &registry,
        &settings,
        &plugins,
        Arc::new(sink_a.clone()),
    );
    let mut wrapper_b = support::make_wrapper(
        "Site1_Beta",
        &echo_plugin_id(TYPE_B),
        &registry,
        &settings,
        &plugins,
        Arc::new(sink_b.clone()),
    );
    support::assert_start_ok(&mut wrapper_a).await;
    support::assert_start_ok(&mut wrapper_b).await;

    Harness {
        deployment,
        sink_a,
        sink_b,
        wrappers: vec![wrapper_a, wrapper_b],
    }
}

impl Harness {
    async fn stop(mut self) {
        for wrapper in self.wrappers.iter_mut() {
            support::assert_stop_ok(wrapper).await;
        }
    }
}

#[tokio::test]
async fn ack_waits_for_publish_to_complete() {
    let sink = RecordingSink::gated();
    let harness = start_harness(BrokerConfig::default(), sink.clone()).await;

    harness.deployment.send_message(TYPE_A, 1_000, vec![0x01]);
    assert!(sink.wait_for_publish_started(1, WAIT).await);
    assert!(harness.deployment.no_ack_within(QUIET).await);

    sink.release(1);
    let ack = harness
        .deployment
        .next_ack(WAIT)
        .await
        .expect("ack once the row is published");
    assert_eq!(ack.message_type, TYPE_A);
    assert_eq!(ack.timestamp, 1_000);
    assert_eq!(sink.row_count(), 1);

    harness.stop().await;
}

#[tokio::test]
async fn malformed_payload_does_not_block_later_messages() {
    let harness = start_harness(BrokerConfig::default(), RecordingSink::new()).await;

    harness.deployment.send_message(TYPE_A, 10, vec![GARBAGE_MARKER]);
    harness.deployment.send_message(TYPE_A, 11, vec![0x01]);
    harness.deployment.send_message(TYPE_B, 12, vec![0x02]);

    assert!(harness.sink_a.wait_for_rows(1, WAIT).await);
    assert!(harness.sink_b.wait_for_rows(1, WAIT).await);
    assert_eq!(harness.sink_a.rows()[0].timestamp, Some(11));

    let mut acked = Vec::new();
    while let Some(ack) = harness.deployment.next_ack(QUIET).await {
        acked.push(ack.timestamp);
    }
    acked.sort_unstable();
    // Rejected payloads stay in the deployment backlog by default.
    assert_eq!(acked, vec![11, 12]);

    harness.stop().await;
}

#[tokio::test]
async fn include_rejected_policy_acks_malformed_payloads() {
    let mut config = BrokerConfig::default();
    config.client.ack_policy = AckPolicy::IncludeRejected;
    let harness = start_harness(config, RecordingSink::new()).await;

    harness.deployment.send_message(TYPE_A, 20, vec![GARBAGE_MARKER]);

    let ack = harness
        .deployment
        .next_ack(WAIT)
        .await
        .expect("rejected payload is acknowledged");
    assert_eq!(ack.message_type, TYPE_A);
    assert_eq!(ack.timestamp, 20);
    assert_eq!(harness.sink_a.row_count(), 0);

    harness.stop().await;
}

#[tokio::test]
async fn refused_publish_is_never_acknowledged() {
    let mut config = BrokerConfig::default();
    config.client.ack_policy = AckPolicy::IncludeRejected;
    let sink = RecordingSink::new();
    sink.set_accept(false);
    let harness = start_harness(config, sink.clone()).await;

    harness.deployment.send_message(TYPE_A, 30, vec![0x01]);

    assert!(sink.wait_for_publish_started(1, WAIT).await);
    assert!(harness.deployment.no_ack_within(QUIET).await);

    harness.stop().await;
}

#[tokio::test]
async fn redelivered_message_is_reacknowledged_without_republishing() {
    let harness = start_harness(BrokerConfig::default(), RecordingSink::new()).await;

    harness.deployment.send_message(TYPE_A, 40, vec![0x01]);
    let first = harness.deployment.next_ack(WAIT).await.expect("first ack");
    harness.deployment.send_message(TYPE_A, 40, vec![0x01]);
    let second = harness.deployment.next_ack(WAIT).await.expect("re-ack");

    assert_eq!(first, second);
    tokio::time::sleep(QUIET).await;
    assert_eq!(harness.sink_a.row_count(), 1);

    // Same timestamp under another type is a distinct message.
    harness.deployment.send_message(TYPE_B, 40, vec![0x02]);
    assert!(harness.sink_b.wait_for_rows(1, WAIT).await);

    harness.stop().await;
}
