//! Workflow run events
//!
//! Published on the engine's [`plughost_core::EventBus`] while a run
//! progresses.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Workflow event
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    WorkflowStarted {
        workflow_id: String,
        execution_id: String,
        timestamp: DateTime<Utc>,
    },
    StepStarted {
        workflow_id: String,
        execution_id: String,
        step_id: String,
    },
    StepCompleted {
        workflow_id: String,
        execution_id: String,
        step_id: String,
        result: Value,
    },
    WorkflowCompleted {
        workflow_id: String,
        execution_id: String,
        success: bool,
        error: Option<String>,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl WorkflowEvent {
    /// ID of the workflow the event belongs to
    pub fn workflow_id(&self) -> &str {
        match self {
            WorkflowEvent::WorkflowStarted { workflow_id, .. }
            | WorkflowEvent::StepStarted { workflow_id, .. }
            | WorkflowEvent::StepCompleted { workflow_id, .. }
            | WorkflowEvent::WorkflowCompleted { workflow_id, .. } => workflow_id,
        }
    }
}
