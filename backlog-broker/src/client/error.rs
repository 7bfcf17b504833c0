//! Failures surfaced by [`DeploymentClient`](super::DeploymentClient).

use crate::codec::FrameError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;

#[derive(Debug)]
pub enum ClientError {
    Connect { address: String, source: io::Error },
    ConnectTimeout { address: String },
    /// The link is down between reconnect attempts.
    NotConnected,
    /// The client has been shut down.
    Closed,
    Frame(FrameError),
    Io(io::Error),
}

impl Display for ClientError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Connect { address, source } => {
                write!(f, "failed to connect to deployment at {address}: {source}")
            }
            ClientError::ConnectTimeout { address } => {
                write!(f, "timed out connecting to deployment at {address}")
            }
            ClientError::NotConnected => write!(f, "deployment link is not connected"),
            ClientError::Closed => write!(f, "deployment client is shut down"),
            ClientError::Frame(err) => write!(f, "failed to frame message: {err}"),
            ClientError::Io(err) => write!(f, "deployment link write failed: {err}"),
        }
    }
}

impl Error for ClientError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ClientError::Connect { source, .. } => Some(source),
            ClientError::Frame(err) => Some(err),
            ClientError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<FrameError> for ClientError {
    fn from(err: FrameError) -> Self {
        ClientError::Frame(err)
    }
}
