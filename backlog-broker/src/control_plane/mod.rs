//! Control-plane ownership of shared per-deployment resources.

mod deployment_registry;

pub use deployment_registry::{DeploymentRegistry, RegistryError, RegistryStats, Released};
