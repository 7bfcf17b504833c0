use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Eq, PartialEq)]
pub enum PluginError {
    UnknownPlugin(String),
    Initialize(String),
    NotInitialized,
    /// The plugin has no handler for host commands or objects.
    OperationNotSupported,
    UnknownCommand(String),
    InvalidParameter { name: String, reason: String },
}

impl PluginError {
    pub(crate) fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        PluginError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

impl Display for PluginError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginError::UnknownPlugin(id) => write!(f, "no plugin registered as {id:?}"),
            PluginError::Initialize(reason) => write!(f, "plugin failed to initialize: {reason}"),
            PluginError::NotInitialized => write!(f, "plugin is not initialized"),
            PluginError::OperationNotSupported => write!(f, "operation not supported"),
            PluginError::UnknownCommand(action) => write!(f, "unknown command {action:?}"),
            PluginError::InvalidParameter { name, reason } => {
                write!(f, "invalid parameter {name:?}: {reason}")
            }
        }
    }
}

impl Error for PluginError {}
