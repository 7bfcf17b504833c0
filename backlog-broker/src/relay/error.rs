use super::flavor::RelayFlavor;
use crate::client::ClientError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;

/// Failures for relay configuration and startup.
#[derive(Debug)]
pub enum RelayError {
    InvalidPort(String),
    InvalidPlatform(String),
    Bind { port: u16, source: io::Error },
    /// A relay of another flavor already serves the deployment.
    FlavorMismatch {
        existing: RelayFlavor,
        requested: RelayFlavor,
    },
    Client(ClientError),
}

impl Display for RelayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayError::InvalidPort(port) => write!(f, "invalid relay port {port:?}"),
            RelayError::InvalidPlatform(platform) => {
                write!(f, "invalid legacy platform id {platform:?}")
            }
            RelayError::Bind { port, source } => {
                write!(f, "unable to listen on relay port {port}: {source}")
            }
            RelayError::FlavorMismatch {
                existing,
                requested,
            } => write!(
                f,
                "deployment already relays with flavor {existing}, requested {requested}"
            ),
            RelayError::Client(err) => write!(f, "relay could not attach to client: {err}"),
        }
    }
}

impl Error for RelayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RelayError::Bind { source, .. } => Some(source),
            RelayError::Client(err) => Some(err),
            _ => None,
        }
    }
}
