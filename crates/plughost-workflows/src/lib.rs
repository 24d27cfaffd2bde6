//! plughost-workflows: declarative workflows over registered tools
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                WorkflowEngine                │
//! │  workflows      tools           agents       │
//! │     │             │               │          │
//! │     ▼             ▼               ▼          │
//! │  WorkflowExecution ──► ToolRegistry ◄── chat │
//! │     │                                        │
//! │     ▼                                        │
//! │  WorkflowContext ({{path}} templates)        │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Steps are `tool`, `condition` (restricted expression language over the
//! `result` variable) and `loop` (runs a body step once per array element).

pub mod agent;
pub mod condition;
pub mod context;
pub mod engine;
pub mod event;
pub mod execution;
pub mod flow;

pub use agent::{
    AgentDefinition, AgentRegistry, ChatMessage, ChatModel, ChatOptions, ChatResponse, ChatRole,
    ModelTurn, PromptTemplateDefinition, PromptVariable, ToolCall,
};
pub use condition::Condition;
pub use context::WorkflowContext;
pub use engine::WorkflowEngine;
pub use event::WorkflowEvent;
pub use execution::{WorkflowExecution, WorkflowResult};
pub use flow::{StepConfig, StepNext, StepType, WorkflowDefinition, WorkflowStep};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::engine::WorkflowEngine;
    pub use super::execution::WorkflowResult;
    pub use super::flow::{WorkflowDefinition, WorkflowStep};
}
