//! plughost-tools: Tool trait and registry
//!
//! Tools are registered by plugins at load time and invoked by the workflow
//! engine, by external callers, or by an AI tool-calling loop.

pub mod registry;
pub mod tool;

// Re-export main types
pub use registry::ToolRegistry;
pub use tool::{BoxedTool, FnTool, Tool, ToolDefinition};
