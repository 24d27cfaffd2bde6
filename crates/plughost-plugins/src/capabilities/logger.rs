//! Per-plugin logger
//!
//! Records go through `tracing` under the `plugin` target with the plugin ID
//! attached, so the host's subscriber decides format and filtering.

use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct PluginLogger {
    plugin_id: String,
}

impl PluginLogger {
    pub(crate) fn new(plugin_id: &str) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
        }
    }

    pub fn debug(&self, message: &str) {
        debug!(target: "plugin", plugin_id = %self.plugin_id, "{}", message);
    }

    pub fn info(&self, message: &str) {
        info!(target: "plugin", plugin_id = %self.plugin_id, "{}", message);
    }

    pub fn warn(&self, message: &str) {
        warn!(target: "plugin", plugin_id = %self.plugin_id, "{}", message);
    }

    pub fn error(&self, message: &str) {
        error!(target: "plugin", plugin_id = %self.plugin_id, "{}", message);
    }
}
