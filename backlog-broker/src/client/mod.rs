//! Deployment link: connection, listener dispatch and acknowledgment.

mod dedupe;
mod deployment_client;
mod error;
mod listener;

pub use deployment_client::{ConnectionState, DeploymentClient};
pub use error::ClientError;
pub use listener::{BackLogMessageListener, DeliveryOutcome};
