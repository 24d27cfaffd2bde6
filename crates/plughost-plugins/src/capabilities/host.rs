//! Host surfaces: user interface, remote servers and remote files
//!
//! These are seams onto the embedding application. The defaults log and
//! return inert results, so a headless host still satisfies plugins that
//! touch them.

use async_trait::async_trait;
use plughost_core::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Severity of a notification or message box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Dialog request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogOptions {
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub buttons: Vec<String>,
}

/// Index of the button the user picked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogResponse {
    pub response: usize,
}

/// Embedding application's UI
#[async_trait]
pub trait UiApi: Send + Sync {
    async fn show_notification(&self, plugin_id: &str, message: &str, level: NoticeLevel) -> Result<()>;
    async fn show_dialog(&self, plugin_id: &str, options: DialogOptions) -> Result<DialogResponse>;
    async fn show_message(&self, plugin_id: &str, message: &str, level: NoticeLevel) -> Result<()>;
}

/// Headless UI: everything goes to the log, dialogs pick the first button
#[derive(Debug, Default)]
pub struct LoggingUi;

#[async_trait]
impl UiApi for LoggingUi {
    async fn show_notification(&self, plugin_id: &str, message: &str, level: NoticeLevel) -> Result<()> {
        info!(plugin_id = %plugin_id, ?level, "Notification: {}", message);
        Ok(())
    }

    async fn show_dialog(&self, plugin_id: &str, options: DialogOptions) -> Result<DialogResponse> {
        info!(plugin_id = %plugin_id, title = %options.title, "Dialog: {}", options.message);
        Ok(DialogResponse { response: 0 })
    }

    async fn show_message(&self, plugin_id: &str, message: &str, level: NoticeLevel) -> Result<()> {
        info!(plugin_id = %plugin_id, ?level, "Message: {}", message);
        Ok(())
    }
}

/// UI handle scoped to one plugin
#[derive(Clone)]
pub struct PluginUi {
    plugin_id: String,
    ui: Arc<dyn UiApi>,
}

impl PluginUi {
    pub(crate) fn new(plugin_id: &str, ui: Arc<dyn UiApi>) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            ui,
        }
    }

    pub async fn show_notification(&self, message: &str, level: NoticeLevel) -> Result<()> {
        self.ui.show_notification(&self.plugin_id, message, level).await
    }

    pub async fn show_dialog(&self, options: DialogOptions) -> Result<DialogResponse> {
        self.ui.show_dialog(&self.plugin_id, options).await
    }

    pub async fn show_message(&self, message: &str, level: NoticeLevel) -> Result<()> {
        self.ui.show_message(&self.plugin_id, message, level).await
    }
}

/// Output of a remote command
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Remote servers known to the host
#[async_trait]
pub trait ServerApi: Send + Sync {
    async fn execute(&self, server_id: &str, command: &str, options: &Value) -> Result<CommandOutput>;
    async fn system_info(&self, server_id: &str) -> Result<Value>;
    async fn list_servers(&self) -> Result<Vec<Value>>;
}

/// Files on remote servers
#[async_trait]
pub trait RemoteFileApi: Send + Sync {
    async fn read(&self, server_id: &str, path: &str) -> Result<String>;
    async fn write(&self, server_id: &str, path: &str, content: &str) -> Result<()>;
    async fn exists(&self, server_id: &str, path: &str) -> Result<bool>;
    async fn delete(&self, server_id: &str, path: &str) -> Result<()>;
    async fn list(&self, server_id: &str, path: &str) -> Result<Vec<Value>>;
}

/// Host without remote servers
#[derive(Debug, Default)]
pub struct NoRemoteHost;

#[async_trait]
impl ServerApi for NoRemoteHost {
    async fn execute(&self, server_id: &str, command: &str, _options: &Value) -> Result<CommandOutput> {
        debug!(server_id = %server_id, command = %command, "No remote host; command ignored");
        Ok(CommandOutput::default())
    }

    async fn system_info(&self, _server_id: &str) -> Result<Value> {
        Ok(json!({}))
    }

    async fn list_servers(&self) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl RemoteFileApi for NoRemoteHost {
    async fn read(&self, _server_id: &str, _path: &str) -> Result<String> {
        Ok(String::new())
    }

    async fn write(&self, server_id: &str, path: &str, _content: &str) -> Result<()> {
        debug!(server_id = %server_id, path = %path, "No remote host; write ignored");
        Ok(())
    }

    async fn exists(&self, _server_id: &str, _path: &str) -> Result<bool> {
        Ok(false)
    }

    async fn delete(&self, _server_id: &str, _path: &str) -> Result<()> {
        Ok(())
    }

    async fn list(&self, _server_id: &str, _path: &str) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }
}
