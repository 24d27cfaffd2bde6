//! Core plugin trait and entry points
//!
//! Plugins are statically linked; a manifest's `main` names a factory in the
//! [`EntryPointRegistry`] that builds the instance around its context.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::context::PluginContext;

/// Lifecycle hooks. Every hook defaults to a no-op.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Called once after construction; register capabilities here
    async fn on_load(&mut self) -> Result<()> {
        Ok(())
    }

    async fn on_enable(&mut self) -> Result<()> {
        Ok(())
    }

    async fn on_disable(&mut self) -> Result<()> {
        Ok(())
    }

    async fn on_unload(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called after the persisted configuration changed
    async fn on_config_change(&mut self, _config: &Value) -> Result<()> {
        Ok(())
    }
}

/// Type alias for boxed plugins
pub type BoxedPlugin = Box<dyn Plugin>;

/// Lifecycle state of a plugin id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    Unloaded,
    Loading,
    Enabled,
    Disabled,
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PluginState::Unloaded => "unloaded",
            PluginState::Loading => "loading",
            PluginState::Enabled => "enabled",
            PluginState::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

/// Builds a plugin instance bound to its context
pub trait PluginFactory: Send + Sync {
    fn create(&self, context: Arc<PluginContext>) -> Result<BoxedPlugin>;
}

impl<F> PluginFactory for F
where
    F: Fn(Arc<PluginContext>) -> Result<BoxedPlugin> + Send + Sync,
{
    fn create(&self, context: Arc<PluginContext>) -> Result<BoxedPlugin> {
        self(context)
    }
}

/// Maps manifest `main` references to factories
#[derive(Default)]
pub struct EntryPointRegistry {
    factories: RwLock<HashMap<String, Arc<dyn PluginFactory>>>,
}

impl EntryPointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any previous one for `main`
    pub async fn register(&self, main: &str, factory: Arc<dyn PluginFactory>) {
        debug!(entry_point = %main, "Registering plugin entry point");
        self.factories
            .write()
            .await
            .insert(main.to_string(), factory);
    }

    pub async fn get(&self, main: &str) -> plughost_core::Result<Arc<dyn PluginFactory>> {
        self.factories
            .read()
            .await
            .get(main)
            .cloned()
            .ok_or_else(|| plughost_core::Error::EntryPointNotFound(main.to_string()))
    }

    /// Registered entry point names, sorted
    pub async fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}
