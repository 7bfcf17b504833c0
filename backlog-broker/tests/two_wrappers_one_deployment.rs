mod support;

use backlog_broker::{
    BrokerConfig, ConnectionState, DeploymentId, DeploymentSettings, FieldValue, MessageType,
};
use integration_test_utils::{
    echo_plugin_id, registry_with_echo_plugins, FakeDeployment, RecordingSink, GARBAGE_MARKER,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use support::{QUIET, WAIT};

#[tokio::test]
async fn two_wrappers_share_then_release_site1() {
    integration_test_utils::init_logging();

    let deployment = FakeDeployment::start().await;
    let registry = support::make_registry(BrokerConfig::default());
    let settings = support::settings_for("site1", DeploymentSettings::new(deployment.address()));
    let (plugins, decoded) = registry_with_echo_plugins(&[MessageType(7), MessageType(9)]);
    let plugins = Arc::new(plugins);

    let sink_a = RecordingSink::new();
    let sink_b = RecordingSink::new();
    let mut wrapper_a = support::make_wrapper(
        "Site1_A",
        &echo_plugin_id(MessageType(7)),
        &registry,
        &settings,
        &plugins,
        Arc::new(sink_a.clone()),
    );
    let mut wrapper_b = support::make_wrapper(
        "Site1_B",
        &echo_plugin_id(MessageType(9)),
        &registry,
        &settings,
        &plugins,
        Arc::new(sink_b.clone()),
    );
    support::assert_start_ok(&mut wrapper_a).await;
    support::assert_start_ok(&mut wrapper_b).await;

    deployment.send_message(MessageType(7), 1_000, vec![0x2a]);
    assert!(sink_a.wait_for_rows(1, WAIT).await);
    assert_eq!(decoded.load(Ordering::SeqCst), 1);
    assert_eq!(sink_a.rows()[0].timestamp, Some(1_000));
    assert_eq!(sink_a.rows()[0].fields, vec![FieldValue::Binary(vec![0x2a])]);
    let ack = deployment.next_ack(WAIT).await.expect("ack for type 7");
    assert_eq!((ack.message_type, ack.timestamp), (MessageType(7), 1_000));

    deployment.send_message(MessageType(9), 1_001, vec![GARBAGE_MARKER]);
    deployment.send_message(MessageType(9), 1_002, vec![0x01]);
    assert!(sink_b.wait_for_rows(1, WAIT).await);
    assert_eq!(sink_b.rows()[0].timestamp, Some(1_002));
    assert_eq!(decoded.load(Ordering::SeqCst), 3);

    let site1 = DeploymentId::new("site1");
    let client = registry.client(&site1).await.expect("client registered");

    support::assert_stop_ok(&mut wrapper_a).await;
    assert_eq!(registry.ref_count(&site1).await, 1);
    assert!(client.is_connected());

    support::assert_stop_ok(&mut wrapper_b).await;
    assert_eq!(registry.ref_count(&site1).await, 0);
    assert!(registry.active_deployments().await.is_empty());
    assert_eq!(client.connection_state(), ConnectionState::Closed);

    tokio::time::sleep(QUIET).await;
    assert_eq!(sink_b.row_count(), 1);
}
