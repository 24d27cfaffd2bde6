//! Built-in plugins

use anyhow::Result;
use async_trait::async_trait;
use plughost_tools::FnTool;
use plughost_workflows::{WorkflowDefinition, WorkflowStep};
use serde_json::json;
use std::sync::Arc;

use crate::context::PluginContext;
use crate::plugin::{BoxedPlugin, EntryPointRegistry, Plugin};

/// Entry point of [`EchoPlugin`]
pub const ECHO_ENTRY_POINT: &str = "builtin:echo";

/// Echo plugin for testing
///
/// Registers an `echo` tool that returns its parameters and an `echo`
/// workflow that runs it once with the `message` input.
pub struct EchoPlugin {
    context: Arc<PluginContext>,
}

impl EchoPlugin {
    pub fn new(context: Arc<PluginContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Plugin for EchoPlugin {
    async fn on_load(&mut self) -> Result<()> {
        let tool = FnTool::sync("echo", "Echo the parameters back", |params| {
            Ok(json!({ "success": true, "echo": params }))
        })
        .with_category("builtin");
        self.context.tools.register(tool.boxed()).await;

        self.context
            .agent
            .register_workflow(
                WorkflowDefinition::new("echo", "Echo")
                    .with_description("Echo the message input")
                    .with_step(
                        WorkflowStep::tool("say", "echo")
                            .with_params(json!({ "message": "{{message}}" })),
                    ),
            )
            .await?;

        self.context.logger.debug("echo tool registered");
        Ok(())
    }
}

/// Register the entry points of every built-in plugin
pub async fn register_builtins(entry_points: &EntryPointRegistry) {
    entry_points
        .register(
            ECHO_ENTRY_POINT,
            Arc::new(|context: Arc<PluginContext>| -> Result<BoxedPlugin> {
                Ok(Box::new(EchoPlugin::new(context)))
            }),
        )
        .await;
}
