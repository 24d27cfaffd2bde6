//! Error types for plughost

use thiserror::Error;

/// Main error type for plughost operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Plugin manifest not found: {0}")]
    ManifestMissing(String),

    #[error("Dependency not found: {0}")]
    DependencyNotFound(String),

    #[error("Version mismatch: {plugin}@{required}")]
    VersionMismatch { plugin: String, required: String },

    #[error("Cyclic dependency: {0}")]
    CyclicDependency(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Unknown workflow: {0}")]
    UnknownWorkflow(String),

    #[error("Loop variable is not an array: {0}")]
    NotAnArray(String),

    #[error("Lifecycle hook {hook} failed for plugin {plugin}: {message}")]
    LifecycleHookFault {
        plugin: String,
        hook: &'static str,
        message: String,
    },

    #[error("Invalid plugin id: {0}")]
    InvalidPluginId(String),

    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),

    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Unknown prompt template: {0}")]
    UnknownPromptTemplate(String),

    #[error("Missing required prompt variable: {0}")]
    MissingPromptVariable(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Plugin not loaded: {0}")]
    NotLoaded(String),

    #[error("Plugin entry point not found: {0}")]
    EntryPointNotFound(String),

    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a lifecycle hook fault
    pub fn hook_fault(plugin: impl Into<String>, hook: &'static str, err: impl std::fmt::Display) -> Self {
        Error::LifecycleHookFault {
            plugin: plugin.into(),
            hook,
            message: err.to_string(),
        }
    }

    /// Create a tool execution error
    pub fn tool_execution(msg: impl Into<String>) -> Self {
        Error::ToolExecution(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    /// Create an invalid workflow error
    pub fn invalid_workflow(msg: impl Into<String>) -> Self {
        Error::InvalidWorkflow(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Whether this error belongs to dependency resolution
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            Error::DependencyNotFound(_) | Error::VersionMismatch { .. } | Error::CyclicDependency(_)
        )
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(format!("{:#}", err))
    }
}
