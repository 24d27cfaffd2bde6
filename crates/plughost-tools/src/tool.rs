//! Core Tool trait and types
//!
//! A tool is a named capability that takes a parameter record and returns a
//! result. Handlers may suspend while they wait on external work.

use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Core trait for all tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name (unique identifier)
    fn name(&self) -> &str;

    /// Get human-readable description
    fn description(&self) -> &str {
        ""
    }

    /// Get JSON schema for the parameter record
    fn input_schema(&self) -> Value {
        serde_json::json!({ "type": "object" })
    }

    /// Execute the tool with the given parameters
    async fn execute(&self, params: Value) -> Result<Value>;

    /// Get the category this tool belongs to
    fn category(&self) -> &str {
        "general"
    }

    /// Metadata snapshot for listings
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
            category: self.category().to_string(),
        }
    }
}

/// Type alias for shared tools
pub type BoxedTool = Arc<dyn Tool>;

/// Tool definition metadata (without the handler)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_schema: Value,
    #[serde(default = "default_category")]
    pub category: String,
}

fn default_category() -> String {
    "general".to_string()
}

type Handler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Tool backed by a closure
#[derive(Clone)]
pub struct FnTool {
    name: String,
    description: String,
    category: String,
    schema: Value,
    handler: Handler,
}

impl FnTool {
    /// Create a tool from an async handler
    pub fn new<F, Fut>(name: &str, description: &str, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            category: default_category(),
            schema: serde_json::json!({ "type": "object" }),
            handler: Arc::new(move |params| -> BoxFuture<'static, Result<Value>> {
                Box::pin(handler(params))
            }),
        }
    }

    /// Create a tool from a synchronous handler
    pub fn sync<F>(name: &str, description: &str, handler: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        Self::new(name, description, move |params| {
            let handler = Arc::clone(&handler);
            async move { handler(params) }
        })
    }

    /// Set the JSON schema
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    /// Set the category
    pub fn with_category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    /// Wrap into a shareable tool handle
    pub fn boxed(self) -> BoxedTool {
        Arc::new(self)
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        self.schema.clone()
    }

    fn category(&self) -> &str {
        &self.category
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        (self.handler)(params).await
    }
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.name)
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}
