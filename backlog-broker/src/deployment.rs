//! Deployment identity.

use std::fmt::{self, Display, Formatter};

/// Logical name of a remote deployment; the registry key.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct DeploymentId(String);

impl DeploymentId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Virtual sensors are named `<deployment>_<rest>`; the deployment part is
    /// case-insensitive.
    pub fn from_virtual_sensor_name(virtual_sensor_name: &str) -> Option<Self> {
        let deployment = virtual_sensor_name.split('_').next()?.trim();
        if deployment.is_empty() {
            return None;
        }
        Some(Self(deployment.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DeploymentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeploymentId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}
