//! Workflow Execution - One run of a workflow definition
//!
//! Steps run strictly one after another; only tool handlers suspend. Any
//! fault ends the run and is reported in the result together with every step
//! result recorded before it.

use futures::future::BoxFuture;
use indexmap::IndexMap;
use plughost_core::{Error, EventBus, Result};
use plughost_tools::ToolRegistry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::condition::Condition;
use crate::context::WorkflowContext;
use crate::event::WorkflowEvent;
use crate::flow::{StepType, WorkflowDefinition, WorkflowStep};

/// Loops nested deeper than this fail the run
const MAX_LOOP_DEPTH: usize = 16;

/// Outcome of a workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResult {
    /// Whether the run reached a terminal step without fault
    pub success: bool,
    /// Step results in execution order
    pub results: IndexMap<String, Value>,
    /// Fault message if the run failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Unique per run
    pub execution_id: String,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

/// A single workflow run
pub struct WorkflowExecution {
    definition: Arc<WorkflowDefinition>,
    context: WorkflowContext,
    tools: Arc<ToolRegistry>,
    events: Arc<EventBus<WorkflowEvent>>,
    execution_id: String,
    loop_depth: usize,
}

impl WorkflowExecution {
    pub fn new(
        definition: Arc<WorkflowDefinition>,
        inputs: HashMap<String, Value>,
        tools: Arc<ToolRegistry>,
        events: Arc<EventBus<WorkflowEvent>>,
    ) -> Self {
        Self {
            definition,
            context: WorkflowContext::new(inputs),
            tools,
            events,
            execution_id: uuid::Uuid::new_v4().to_string(),
            loop_depth: 0,
        }
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// Run to completion. Never fails; faults are reported in the result.
    pub async fn run(mut self) -> WorkflowResult {
        let start = Instant::now();
        let workflow_id = self.definition.id.clone();

        info!(
            workflow_id = %workflow_id,
            execution_id = %self.execution_id,
            "Starting workflow execution"
        );
        self.events
            .emit(&WorkflowEvent::WorkflowStarted {
                workflow_id: workflow_id.clone(),
                execution_id: self.execution_id.clone(),
                timestamp: chrono::Utc::now(),
            })
            .await;

        let outcome = self.drive().await;
        let duration_ms = start.elapsed().as_millis() as u64;
        let error = outcome.err().map(|e| e.to_string());
        let success = error.is_none();

        if let Some(ref message) = error {
            warn!(
                workflow_id = %workflow_id,
                execution_id = %self.execution_id,
                error = %message,
                "Workflow execution failed"
            );
        } else {
            info!(
                workflow_id = %workflow_id,
                execution_id = %self.execution_id,
                duration_ms = duration_ms,
                "Workflow execution complete"
            );
        }

        self.events
            .emit(&WorkflowEvent::WorkflowCompleted {
                workflow_id,
                execution_id: self.execution_id.clone(),
                success,
                error: error.clone(),
                duration_ms,
                timestamp: chrono::Utc::now(),
            })
            .await;

        WorkflowResult {
            success,
            results: self.context.into_results(),
            error,
            execution_id: self.execution_id,
            duration_ms,
        }
    }

    async fn drive(&mut self) -> Result<()> {
        let definition = Arc::clone(&self.definition);
        let mut cursor = definition.steps.first().map(|s| s.id.as_str());

        while let Some(step_id) = cursor {
            let Some(step) = definition.step(step_id) else {
                debug!(workflow_id = %definition.id, step_id = %step_id, "Cursor left the workflow");
                break;
            };

            self.events
                .emit(&WorkflowEvent::StepStarted {
                    workflow_id: definition.id.clone(),
                    execution_id: self.execution_id.clone(),
                    step_id: step.id.clone(),
                })
                .await;

            let result = self.execute_step(step).await?;
            self.context.set_step_result(&step.id, result.clone());
            cursor = step.next_after(&result);

            self.events
                .emit(&WorkflowEvent::StepCompleted {
                    workflow_id: definition.id.clone(),
                    execution_id: self.execution_id.clone(),
                    step_id: step.id.clone(),
                    result,
                })
                .await;
        }

        Ok(())
    }

    fn execute_step<'a>(&'a mut self, step: &'a WorkflowStep) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            debug!(
                execution_id = %self.execution_id,
                step_id = %step.id,
                step_type = %step.step_type,
                "Executing step"
            );
            match step.step_type {
                StepType::Tool => self.execute_tool(step).await,
                StepType::Condition => self.evaluate_condition(step),
                StepType::Loop => self.execute_loop(step).await,
            }
        })
    }

    async fn execute_tool(&self, step: &WorkflowStep) -> Result<Value> {
        let tool = step.config.tool.as_deref().ok_or_else(|| {
            Error::invalid_workflow(format!("tool step '{}' names no tool", step.id))
        })?;
        let params = self.context.resolve_params(&step.config.params);
        self.tools.execute(tool, Value::Object(params)).await
    }

    fn evaluate_condition(&self, step: &WorkflowStep) -> Result<Value> {
        let expression = step.config.condition.as_deref().ok_or_else(|| {
            Error::invalid_workflow(format!("condition step '{}' has no condition", step.id))
        })?;
        let result = self.context.get("result").cloned().unwrap_or(Value::Null);
        Ok(Value::Bool(Condition::parse(expression)?.evaluate(&result)))
    }

    async fn execute_loop(&mut self, step: &WorkflowStep) -> Result<Value> {
        let loop_over = step.config.loop_over.as_deref().unwrap_or_default();
        let items = match self.context.get(loop_over) {
            Some(Value::Array(items)) => items.clone(),
            _ => return Err(Error::NotAnArray(loop_over.to_string())),
        };

        let definition = Arc::clone(&self.definition);
        let body_id = step.config.body.as_deref().unwrap_or_default();
        let body = definition.step(body_id).ok_or_else(|| {
            Error::invalid_workflow(format!("loop step '{}' body '{}' is not a step", step.id, body_id))
        })?;

        if self.loop_depth >= MAX_LOOP_DEPTH {
            return Err(Error::invalid_workflow(format!(
                "loop step '{}' nested deeper than {} loops",
                step.id, MAX_LOOP_DEPTH
            )));
        }

        self.loop_depth += 1;
        let mut results = Vec::with_capacity(items.len());
        let mut outcome = Ok(());
        for item in items {
            self.context.set("item", item);
            match self.execute_step(body).await {
                Ok(value) => results.push(value),
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }
        self.loop_depth -= 1;
        outcome.map(|_| Value::Array(results))
    }
}
