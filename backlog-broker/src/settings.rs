//! Deployment-scoped settings and the contract for looking them up.

use crate::deployment::DeploymentId;
use crate::relay::{RelayError, RelaySpec};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Settings shared by every virtual sensor of one deployment.
#[derive(Deserialize, Serialize, Debug, Clone, Eq, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct DeploymentSettings {
    pub address: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub local_sf_port: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub tinyos1x_platform: Option<String>,
}

impl DeploymentSettings {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            local_sf_port: None,
            tinyos1x_platform: None,
        }
    }

    pub fn with_relay_port(mut self, port: impl ToString) -> Self {
        self.local_sf_port = Some(port.to_string());
        self
    }

    pub fn with_legacy_platform(mut self, platform: impl ToString) -> Self {
        self.tinyos1x_platform = Some(platform.to_string());
        self
    }

    /// `None` when no relay port is configured.
    pub fn relay_spec(&self) -> Option<Result<RelaySpec, RelayError>> {
        self.local_sf_port
            .as_deref()
            .map(|port| RelaySpec::parse(port, self.tinyos1x_platform.as_deref()))
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    }))
}

#[derive(Debug)]
pub enum SettingsError {
    NotFound(DeploymentId),
    Unreadable {
        deployment: DeploymentId,
        reason: String,
    },
    MissingAddress(DeploymentId),
}

impl Display for SettingsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::NotFound(deployment) => {
                write!(f, "no settings for deployment {deployment}")
            }
            SettingsError::Unreadable { deployment, reason } => {
                write!(f, "unable to read settings for deployment {deployment}: {reason}")
            }
            SettingsError::MissingAddress(deployment) => {
                write!(f, "deployment {deployment} has no address configured")
            }
        }
    }
}

impl Error for SettingsError {}

/// Resolves the settings of a deployment.
pub trait DeploymentSettingsSource: Send + Sync {
    fn deployment_settings(&self, deployment: &DeploymentId) -> Result<DeploymentSettings, SettingsError>;
}

/// In-memory settings, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticDeploymentSettings {
    settings: HashMap<DeploymentId, DeploymentSettings>,
}

impl StaticDeploymentSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, deployment: impl Into<DeploymentId>, settings: DeploymentSettings) -> Self {
        self.insert(deployment, settings);
        self
    }

    pub fn insert(&mut self, deployment: impl Into<DeploymentId>, settings: DeploymentSettings) {
        self.settings.insert(deployment.into(), settings);
    }
}

impl DeploymentSettingsSource for StaticDeploymentSettings {
    fn deployment_settings(&self, deployment: &DeploymentId) -> Result<DeploymentSettings, SettingsError> {
        let settings = self
            .settings
            .get(deployment)
            .cloned()
            .ok_or_else(|| SettingsError::NotFound(deployment.clone()))?;
        if settings.address.trim().is_empty() {
            return Err(SettingsError::MissingAddress(deployment.clone()));
        }
        Ok(settings)
    }
}
