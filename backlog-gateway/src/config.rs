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

use backlog_broker::{
    BrokerConfig, DeploymentSettings, DeploymentSettingsSource, StaticDeploymentSettings,
    WrapperConfig,
};
use deployment_settings_file::DeploymentSettingsFile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub(crate) broker: BrokerConfig,
    pub(crate) deployment_settings: DeploymentSettingsConfig,
    pub(crate) wrappers: Vec<WrapperConfig>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct DeploymentSettingsConfig {
    #[serde(default)]
    pub(crate) mode: DeploymentSettingsMode,
    /// Directory of `<deployment>.json5` files, for `static_dir`.
    #[serde(default)]
    pub(crate) dir: Option<String>,
    /// Settings keyed by deployment id, for `inline`.
    #[serde(default)]
    pub(crate) deployments: BTreeMap<String, DeploymentSettings>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentSettingsMode {
    #[default]
    StaticDir,
    Inline,
}

impl DeploymentSettingsConfig {
    pub fn build_source(&self) -> Result<Arc<dyn DeploymentSettingsSource>, String> {
        match self.mode {
            DeploymentSettingsMode::StaticDir => {
                let dir = self
                    .dir
                    .as_deref()
                    .ok_or("deployment_settings.dir is required in static_dir mode")?;
                Ok(Arc::new(DeploymentSettingsFile::new(dir)))
            }
            DeploymentSettingsMode::Inline => {
                let mut source = StaticDeploymentSettings::new();
                for (deployment, settings) in &self.deployments {
                    source.insert(deployment.as_str(), settings.clone());
                }
                Ok(Arc::new(source))
            }
        }
    }
}

impl Config {
    pub fn from_json5(contents: &str) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(json5::from_str(contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, DeploymentSettingsMode};
    use backlog_broker::{AckPolicy, DeploymentId};

    const INLINE_CONFIG: &str = r#"{
        broker: { client: { ack_policy: "include_rejected", reconnect_max_ms: 5000 } },
        deployment_settings: {
            mode: "inline",
            deployments: {
                site1: { address: "127.0.0.1:9100", "local-sf-port": 9002 },
            },
        },
        wrappers: [
            { "virtual-sensor-name": "Site1_Motes", predicates: { "plugin-classname": "mig" } },
        ],
    }"#;

    #[test]
    fn inline_config_builds_a_settings_source() {
        let config = Config::from_json5(INLINE_CONFIG).expect("config parses");

        assert_eq!(config.broker.client.ack_policy, AckPolicy::IncludeRejected);
        assert_eq!(config.broker.client.reconnect_max_ms, 5_000);
        assert_eq!(config.deployment_settings.mode, DeploymentSettingsMode::Inline);
        assert_eq!(config.wrappers[0].plugin_id(), Some("mig"));

        let source = config
            .deployment_settings
            .build_source()
            .expect("inline source");
        let settings = source
            .deployment_settings(&DeploymentId::new("site1"))
            .expect("site1 is configured");
        assert_eq!(settings.address, "127.0.0.1:9100");
        assert_eq!(settings.local_sf_port.as_deref(), Some("9002"));
    }

    #[test]
    fn static_dir_mode_requires_a_directory() {
        let config = Config::from_json5(
            r#"{ deployment_settings: { mode: "static_dir" }, wrappers: [] }"#,
        )
        .expect("config parses");

        assert!(config.deployment_settings.build_source().is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_json5(
            r#"{ deployment_settings: { dir: "." }, wrappers: [], streamer: {} }"#
        )
        .is_err());
    }
}
