use backlog_broker::{
    BacklogWrapper, BrokerConfig, ClientConfig, DeploymentRegistry, DeploymentSettings,
    PluginRegistry, PublishSink, StaticDeploymentSettings, WrapperConfig, WrapperState,
};
use std::sync::Arc;
use std::time::Duration;

pub(crate) const WAIT: Duration = Duration::from_secs(5);
pub(crate) const QUIET: Duration = Duration::from_millis(300);

/// Short backoff so reconnect tests finish quickly.
pub(crate) fn fast_broker_config() -> BrokerConfig {
    BrokerConfig {
        client: ClientConfig {
            connect_timeout_ms: 1_000,
            reconnect_initial_ms: 20,
            reconnect_max_ms: 100,
            ..ClientConfig::default()
        },
        ..BrokerConfig::default()
    }
}

pub(crate) fn make_registry(config: BrokerConfig) -> Arc<DeploymentRegistry> {
    Arc::new(DeploymentRegistry::new(config))
}

pub(crate) fn settings_for(deployment: &str, settings: DeploymentSettings) -> Arc<StaticDeploymentSettings> {
    Arc::new(StaticDeploymentSettings::new().with(deployment, settings))
}

pub(crate) fn make_wrapper(
    virtual_sensor: &str,
    plugin_id: &str,
    registry: &Arc<DeploymentRegistry>,
    settings: &Arc<StaticDeploymentSettings>,
    plugins: &Arc<PluginRegistry>,
    sink: Arc<dyn PublishSink>,
) -> BacklogWrapper {
    BacklogWrapper::new(
        WrapperConfig::new(virtual_sensor).with_plugin(plugin_id),
        registry.clone(),
        settings.clone(),
        plugins.clone(),
        sink,
    )
}

pub(crate) async fn assert_start_ok(wrapper: &mut BacklogWrapper) {
    wrapper
        .start()
        .await
        .expect("wrapper start should succeed");
    assert_eq!(wrapper.state(), WrapperState::Active);
}

#[allow(dead_code)]
pub(crate) async fn assert_stop_ok(wrapper: &mut BacklogWrapper) {
    wrapper.stop().await.expect("wrapper stop should succeed");
    assert_eq!(wrapper.state(), WrapperState::Disposed);
}
