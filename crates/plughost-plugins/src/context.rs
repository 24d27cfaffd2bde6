//! Plugin context
//!
//! Everything a plugin instance may touch. Each service is already scoped to
//! the plugin's ID, so a plugin cannot reach another plugin's storage or
//! remove another plugin's registrations.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::capabilities::contributions::{ScopedCommands, ScopedMenus, ScopedRoutes};
use crate::capabilities::events::ScopedEvents;
use crate::capabilities::host::{PluginUi, RemoteFileApi, ServerApi};
use crate::capabilities::http::PluginHttp;
use crate::capabilities::logger::PluginLogger;
use crate::capabilities::registrations::{AgentApi, ToolsApi};
use crate::capabilities::secure::SecureStorage;
use crate::capabilities::storage::PluginStorage;
use crate::manifest::PluginMetadata;

pub struct PluginContext {
    pub plugin_id: String,
    pub metadata: PluginMetadata,
    pub(crate) config: RwLock<Value>,
    pub storage: PluginStorage,
    pub secure_storage: SecureStorage,
    pub http: PluginHttp,
    pub ui: PluginUi,
    pub server: Arc<dyn ServerApi>,
    pub files: Arc<dyn RemoteFileApi>,
    pub events: ScopedEvents,
    pub agent: AgentApi,
    pub tools: ToolsApi,
    pub menus: ScopedMenus,
    pub routes: ScopedRoutes,
    pub commands: ScopedCommands,
    pub logger: PluginLogger,
}

impl PluginContext {
    /// Current configuration snapshot
    pub async fn config(&self) -> Value {
        self.config.read().await.clone()
    }

    pub(crate) async fn set_config(&self, config: Value) {
        *self.config.write().await = config;
    }

    /// Whether the manifest grants a capability tag
    pub fn has_permission(&self, tag: &str) -> bool {
        self.metadata.has_permission(tag)
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin_id", &self.plugin_id)
            .field("version", &self.metadata.version)
            .finish()
    }
}
