//! Tool Registry
//!
//! Name-keyed registry of tools. Registration is an upsert. Lookups hand out
//! an `Arc` clone so the lock is released before a (possibly slow) handler runs.

use plughost_core::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::tool::{BoxedTool, ToolDefinition};

/// Tool Registry
pub struct ToolRegistry {
    tools: RwLock<HashMap<Arc<str>, BoxedTool>>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
        }
    }

    /// Register a tool, replacing any tool with the same name.
    ///
    /// Returns true if an existing tool was replaced.
    pub async fn register(&self, tool: BoxedTool) -> bool {
        let name: Arc<str> = Arc::from(tool.name());
        let replaced = self.tools.write().await.insert(name.clone(), tool).is_some();
        if replaced {
            debug!(tool = %name, "Replaced tool");
        } else {
            debug!(tool = %name, "Registered tool");
        }
        replaced
    }

    /// Remove a tool by name
    pub async fn unregister(&self, name: &str) -> bool {
        let removed = self.tools.write().await.remove(name).is_some();
        if removed {
            debug!(tool = %name, "Unregistered tool");
        }
        removed
    }

    /// Get a tool by name
    pub async fn get(&self, name: &str) -> Option<BoxedTool> {
        self.tools.read().await.get(name).cloned()
    }

    /// Check whether a tool is registered
    pub async fn contains(&self, name: &str) -> bool {
        self.tools.read().await.contains_key(name)
    }

    /// List all tool definitions, sorted by name
    pub async fn list(&self) -> Vec<ToolDefinition> {
        let tools = self.tools.read().await;
        let mut definitions: Vec<ToolDefinition> = tools.values().map(|t| t.definition()).collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Invoke a tool by name.
    ///
    /// Fails with [`Error::UnknownTool`] if nothing is registered under `name`
    /// and [`Error::ToolExecution`] if the handler itself fails.
    pub async fn execute(&self, name: &str, params: Value) -> Result<Value> {
        let tool = self
            .get(name)
            .await
            .ok_or_else(|| Error::UnknownTool(name.to_string()))?;

        tool.execute(params).await.map_err(|e| {
            warn!(tool = %name, error = %e, "Tool execution failed");
            Error::tool_execution(format!("{}: {:#}", name, e))
        })
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
