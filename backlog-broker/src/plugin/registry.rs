use super::backlog_status::{BacklogStatusPlugin, BACKLOG_STATUS_PLUGIN_ID};
use super::error::PluginError;
use super::mig::{MigPlugin, MIG_PLUGIN_ID};
use super::Plugin;
use std::collections::HashMap;
use std::sync::Arc;

pub type PluginFactory = Arc<dyn Fn() -> Box<dyn Plugin> + Send + Sync>;

/// Maps configured plugin identifiers to constructors.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    factories: HashMap<String, PluginFactory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(MIG_PLUGIN_ID, || Box::new(MigPlugin::new()));
        registry.register(BACKLOG_STATUS_PLUGIN_ID, || {
            Box::new(BacklogStatusPlugin::new())
        });
        registry
    }

    /// Returns `false` when `id` replaced an earlier registration.
    pub fn register<F>(&mut self, id: impl Into<String>, factory: F) -> bool
    where
        F: Fn() -> Box<dyn Plugin> + Send + Sync + 'static,
    {
        self.factories
            .insert(id.into(), Arc::new(factory))
            .is_none()
    }

    pub fn instantiate(&self, id: &str) -> Result<Box<dyn Plugin>, PluginError> {
        self.factories
            .get(id)
            .map(|factory| factory())
            .ok_or_else(|| PluginError::UnknownPlugin(id.to_string()))
    }

    pub fn identifiers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}
