//! Workflow Flow - Declarative step graphs
//!
//! A workflow is an ordered list of steps. Execution always starts at the
//! first step and follows each step's `next` pointer until it runs out.

use plughost_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::condition::Condition;

/// Workflow definition (serializable)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Steps; the first one is the entry point
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
}

/// Kind of work a step performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    /// Invoke a registered tool
    Tool,
    /// Evaluate a boolean expression over the `result` variable
    Condition,
    /// Run a body step once per element of an array variable
    Loop,
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepType::Tool => write!(f, "tool"),
            StepType::Condition => write!(f, "condition"),
            StepType::Loop => write!(f, "loop"),
        }
    }
}

/// Step configuration. Which fields matter depends on the step type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepConfig {
    /// Tool name (tool steps)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Tool parameters; string values may contain `{{path}}` templates
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
    /// Boolean expression (condition steps)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Name of the array variable to iterate (loop steps)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_over: Option<String>,
    /// Step executed once per element (loop steps)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Successor of a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepNext {
    /// Unconditional successor
    Single(String),
    /// `[whenTrue, whenFalse]`; a null target ends the run
    Branch(Option<String>, Option<String>),
}

impl StepNext {
    /// Pick the successor for a step result.
    ///
    /// A branch takes its first target when the result is exactly `true` or
    /// a record whose `success` field is `true`.
    pub fn target(&self, result: &Value) -> Option<&str> {
        match self {
            StepNext::Single(id) => Some(id.as_str()),
            StepNext::Branch(when_true, when_false) => {
                let taken = matches!(result, Value::Bool(true))
                    || matches!(result.get("success"), Some(Value::Bool(true)));
                if taken {
                    when_true.as_deref()
                } else {
                    when_false.as_deref()
                }
            }
        }
    }
}

/// One step of a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Step ID (unique within the workflow)
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub config: StepConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<StepNext>,
}

impl WorkflowStep {
    fn new(id: &str, step_type: StepType, config: StepConfig) -> Self {
        Self {
            id: id.to_string(),
            step_type,
            name: id.to_string(),
            config,
            next: None,
        }
    }

    /// Create a tool step
    pub fn tool(id: &str, tool: &str) -> Self {
        Self::new(
            id,
            StepType::Tool,
            StepConfig {
                tool: Some(tool.to_string()),
                ..Default::default()
            },
        )
    }

    /// Create a condition step
    pub fn condition(id: &str, expression: &str) -> Self {
        Self::new(
            id,
            StepType::Condition,
            StepConfig {
                condition: Some(expression.to_string()),
                ..Default::default()
            },
        )
    }

    /// Create a loop step running `body` once per element of `loop_over`
    pub fn for_each(id: &str, loop_over: &str, body: &str) -> Self {
        Self::new(
            id,
            StepType::Loop,
            StepConfig {
                loop_over: Some(loop_over.to_string()),
                body: Some(body.to_string()),
                ..Default::default()
            },
        )
    }

    /// Set the display name
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Set tool parameters from a JSON object; other values are ignored
    pub fn with_params(mut self, params: Value) -> Self {
        if let Value::Object(map) = params {
            self.config.params = map;
        }
        self
    }

    /// Continue unconditionally with `next`
    pub fn then(mut self, next: &str) -> Self {
        self.next = Some(StepNext::Single(next.to_string()));
        self
    }

    /// Branch on the step result
    pub fn branch(mut self, when_true: &str, when_false: &str) -> Self {
        self.next = Some(StepNext::Branch(
            Some(when_true.to_string()),
            Some(when_false.to_string()),
        ));
        self
    }

    /// Successor for the given result, if any
    pub fn next_after(&self, result: &Value) -> Option<&str> {
        self.next.as_ref().and_then(|next| next.target(result))
    }
}

impl WorkflowDefinition {
    /// Create an empty workflow definition
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            steps: Vec::new(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Append a step
    pub fn with_step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Find a step by ID
    pub fn step(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Validate the workflow definition
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::invalid_workflow("workflow id is empty"));
        }

        let mut seen_ids = HashSet::new();
        for step in &self.steps {
            if !seen_ids.insert(step.id.as_str()) {
                return Err(Error::invalid_workflow(format!(
                    "{}: duplicate step id '{}'",
                    self.id, step.id
                )));
            }
        }

        for step in &self.steps {
            match step.step_type {
                StepType::Tool => {
                    if step.config.tool.as_deref().map_or(true, str::is_empty) {
                        return Err(Error::invalid_workflow(format!(
                            "{}: tool step '{}' names no tool",
                            self.id, step.id
                        )));
                    }
                }
                StepType::Condition => {
                    let expression = step.config.condition.as_deref().ok_or_else(|| {
                        Error::invalid_workflow(format!(
                            "{}: condition step '{}' has no condition",
                            self.id, step.id
                        ))
                    })?;
                    Condition::parse(expression).map_err(|e| {
                        Error::invalid_workflow(format!("{}: step '{}': {}", self.id, step.id, e))
                    })?;
                }
                StepType::Loop => {
                    if step.config.loop_over.is_none() {
                        return Err(Error::invalid_workflow(format!(
                            "{}: loop step '{}' has no loopOver",
                            self.id, step.id
                        )));
                    }
                    match step.config.body.as_deref() {
                        Some(body) if body == step.id => {
                            return Err(Error::invalid_workflow(format!(
                                "{}: loop step '{}' names itself as body",
                                self.id, step.id
                            )))
                        }
                        Some(body) if self.step(body).map(|b| b.step_type) == Some(StepType::Loop) => {
                            return Err(Error::invalid_workflow(format!(
                                "{}: loop step '{}' body '{}' is itself a loop",
                                self.id, step.id, body
                            )))
                        }
                        Some(body) if seen_ids.contains(body) => {}
                        Some(body) => {
                            return Err(Error::invalid_workflow(format!(
                                "{}: loop step '{}' body '{}' is not a step",
                                self.id, step.id, body
                            )))
                        }
                        None => {
                            return Err(Error::invalid_workflow(format!(
                                "{}: loop step '{}' has no body",
                                self.id, step.id
                            )))
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
