//! Plugin system facade
//!
//! Wires the workflow engine, capability services and loader together and
//! coordinates with the marketplace over an explicit channel.

use plughost_core::{HostConfig, Result};
use plughost_workflows::WorkflowEngine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::builtin::register_builtins;
use crate::capabilities::Capabilities;
use crate::loader::{InitReport, PluginLoader};
use crate::plugin::EntryPointRegistry;

/// Marketplace notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "plugin_id", rename_all = "snake_case")]
pub enum MarketEvent {
    Installed(String),
    Uninstalled(String),
}

/// Plugin system
pub struct PluginSystem {
    config: Arc<HostConfig>,
    engine: Arc<WorkflowEngine>,
    loader: Arc<PluginLoader>,
}

impl PluginSystem {
    /// Build the system with default capability services
    pub async fn new(config: HostConfig) -> Result<Self> {
        let engine = Arc::new(WorkflowEngine::new());
        let capabilities = Capabilities::new(&config, Arc::clone(&engine))?;
        Self::with_capabilities(config, engine, capabilities).await
    }

    /// Build the system around customised capability services
    pub async fn with_capabilities(
        config: HostConfig,
        engine: Arc<WorkflowEngine>,
        capabilities: Capabilities,
    ) -> Result<Self> {
        let entry_points = Arc::new(EntryPointRegistry::new());
        register_builtins(&entry_points).await;

        let loader = PluginLoader::new(config.plugins_dir.clone(), Arc::new(capabilities), entry_points)
            .with_enforce_dependencies(config.enforce_dependencies);

        Ok(Self {
            config: Arc::new(config),
            engine,
            loader: Arc::new(loader),
        })
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<WorkflowEngine> {
        &self.engine
    }

    pub fn loader(&self) -> &Arc<PluginLoader> {
        &self.loader
    }

    /// Prepare storage and load every installed plugin
    pub async fn initialize(&self) -> Result<InitReport> {
        info!(plugins_dir = %self.config.plugins_dir.display(), "Initializing plugin system");
        self.loader.initialize().await
    }

    pub async fn load_plugin(&self, id: &str) -> Result<()> {
        self.loader.load_plugin(id).await
    }

    pub async fn unload_plugin(&self, id: &str) -> Result<()> {
        self.loader.unload_plugin(id).await
    }

    /// Follow marketplace events, in arrival order, until the sender closes
    pub fn attach_market(&self, events: mpsc::Receiver<MarketEvent>) -> JoinHandle<()> {
        let loader = Arc::clone(&self.loader);
        tokio::spawn(follow_market(loader, events))
    }

    /// Unload every plugin
    pub async fn shutdown(&self) {
        info!("Shutting down plugin system");
        self.loader.unload_all().await;
    }
}

async fn follow_market(loader: Arc<PluginLoader>, mut events: mpsc::Receiver<MarketEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            MarketEvent::Installed(id) => {
                if let Err(e) = loader.load_plugin(&id).await {
                    error!(plugin_id = %id, "Failed to load installed plugin: {}", e);
                }
            }
            MarketEvent::Uninstalled(id) => {
                if let Err(e) = loader.unload_plugin(&id).await {
                    error!(plugin_id = %id, "Failed to unload uninstalled plugin: {}", e);
                }
                loader.resolver().write().await.unregister_plugin(&id);
            }
        }
    }
    info!("Marketplace channel closed");
}
