//! Workflow Engine - Registries and entry points for running capabilities
//!
//! The engine holds three registries (workflows, tools, agents) that plugins
//! fill at load time and external callers read when they run something.
//! Each `execute` call gets its own context, so runs may overlap.

use plughost_core::{Error, EventBus, Result};
use plughost_tools::{BoxedTool, ToolDefinition, ToolRegistry};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::agent::{AgentDefinition, AgentRegistry, ChatOptions, ChatResponse, PromptTemplateDefinition};
use crate::event::WorkflowEvent;
use crate::execution::{WorkflowExecution, WorkflowResult};
use crate::flow::WorkflowDefinition;

/// Workflow Engine
pub struct WorkflowEngine {
    /// Registered workflow definitions
    workflows: RwLock<HashMap<String, Arc<WorkflowDefinition>>>,
    /// Tool registry shared with plugins
    tools: Arc<ToolRegistry>,
    /// Agents and prompt templates
    agents: AgentRegistry,
    /// Run progress events
    events: Arc<EventBus<WorkflowEvent>>,
}

impl WorkflowEngine {
    /// Create an engine with empty registries
    pub fn new() -> Self {
        Self::with_tools(Arc::new(ToolRegistry::new()))
    }

    /// Create an engine around an existing tool registry
    pub fn with_tools(tools: Arc<ToolRegistry>) -> Self {
        Self {
            workflows: RwLock::new(HashMap::new()),
            tools,
            agents: AgentRegistry::new(),
            events: Arc::new(EventBus::new()),
        }
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    /// Bus carrying [`WorkflowEvent`]s for every run
    pub fn events(&self) -> &Arc<EventBus<WorkflowEvent>> {
        &self.events
    }

    /// Register a workflow definition, replacing any with the same ID.
    ///
    /// Invalid definitions are rejected and not registered.
    pub async fn register_workflow(&self, definition: WorkflowDefinition) -> Result<()> {
        definition.validate()?;
        info!(workflow_id = %definition.id, steps = definition.steps.len(), "Registering workflow");
        self.workflows
            .write()
            .await
            .insert(definition.id.clone(), Arc::new(definition));
        Ok(())
    }

    pub async fn unregister_workflow(&self, workflow_id: &str) -> bool {
        self.workflows.write().await.remove(workflow_id).is_some()
    }

    /// Get a workflow definition
    pub async fn get_workflow(&self, workflow_id: &str) -> Option<WorkflowDefinition> {
        let workflows = self.workflows.read().await;
        workflows.get(workflow_id).map(|d| d.as_ref().clone())
    }

    /// List all workflow definitions, sorted by ID
    pub async fn list_workflows(&self) -> Vec<WorkflowDefinition> {
        let workflows = self.workflows.read().await;
        let mut list: Vec<WorkflowDefinition> =
            workflows.values().map(|d| d.as_ref().clone()).collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    /// Register a tool, replacing any tool with the same name
    pub async fn register_tool(&self, tool: BoxedTool) {
        self.tools.register(tool).await;
    }

    pub async fn unregister_tool(&self, name: &str) -> bool {
        self.tools.unregister(name).await
    }

    pub async fn list_tools(&self) -> Vec<ToolDefinition> {
        self.tools.list().await
    }

    pub async fn register_agent(&self, agent: AgentDefinition) {
        self.agents.register_agent(agent).await;
    }

    pub async fn register_prompt_template(&self, template: PromptTemplateDefinition) {
        self.agents.register_prompt_template(template).await;
    }

    /// Render a registered prompt template
    pub async fn render_prompt(&self, template_id: &str, variables: &Map<String, Value>) -> Result<String> {
        self.agents.render_prompt(template_id, variables).await
    }

    /// Chat with a registered agent using the engine's tools
    pub async fn chat(&self, agent_id: &str, prompt: &str, options: ChatOptions) -> Result<ChatResponse> {
        self.agents.chat(agent_id, prompt, options, &self.tools).await
    }

    /// Execute a workflow by ID.
    ///
    /// Fails only if the workflow is unknown. Every fault during the run is
    /// reported through [`WorkflowResult::error`] instead.
    pub async fn execute(&self, workflow_id: &str, inputs: HashMap<String, Value>) -> Result<WorkflowResult> {
        let definition = {
            let workflows = self.workflows.read().await;
            workflows.get(workflow_id).cloned()
        }
        .ok_or_else(|| Error::UnknownWorkflow(workflow_id.to_string()))?;

        let execution = WorkflowExecution::new(
            definition,
            inputs,
            Arc::clone(&self.tools),
            Arc::clone(&self.events),
        );
        Ok(execution.run().await)
    }

    /// Invoke a registered tool directly, outside any workflow
    pub async fn execute_tool(&self, name: &str, params: Value) -> Result<Value> {
        self.tools.execute(name, params).await
    }
}

impl Default for WorkflowEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::WorkflowStep;
    use plughost_tools::FnTool;
    use serde_json::json;
    use std::sync::Mutex;

    fn inputs(value: Value) -> HashMap<String, Value> {
        match value {
            Value::Object(map) => map.into_iter().collect(),
            _ => HashMap::new(),
        }
    }

    async fn engine_with_recorder() -> (WorkflowEngine, Arc<Mutex<Vec<Value>>>) {
        let engine = WorkflowEngine::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorded = calls.clone();
        engine
            .register_tool(
                FnTool::sync("record", "Record params", move |params| {
                    recorded.lock().unwrap().push(params.clone());
                    Ok(json!({"success": true, "echo": params}))
                })
                .boxed(),
            )
            .await;
        engine
            .register_tool(FnTool::sync("fail", "Always fails", |_| anyhow::bail!("disk full")).boxed())
            .await;
        (engine, calls)
    }

    #[tokio::test]
    async fn test_single_tool_step() {
        let engine = WorkflowEngine::new();
        engine
            .register_tool(FnTool::sync("ok", "", |_| Ok(json!({"success": true}))).boxed())
            .await;
        engine
            .register_workflow(
                WorkflowDefinition::new("one", "One").with_step(WorkflowStep::tool("step1", "ok")),
            )
            .await
            .unwrap();

        let result = engine.execute("one", HashMap::new()).await.unwrap();
        assert!(result.success);
        assert!(result.error.is_none());
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results["step1"], json!({"success": true}));
    }

    #[tokio::test]
    async fn test_unknown_workflow_fails_immediately() {
        let engine = WorkflowEngine::new();
        let err = engine.execute("ghost", HashMap::new()).await.unwrap_err();
        assert!(matches!(err, Error::UnknownWorkflow(_)));
    }

    #[tokio::test]
    async fn test_condition_routes_on_result_variable() {
        let (engine, calls) = engine_with_recorder().await;
        engine
            .register_workflow(
                WorkflowDefinition::new("route", "Route")
                    .with_step(WorkflowStep::condition("check", "result").branch("yes", "no"))
                    .with_step(WorkflowStep::tool("yes", "record").with_params(json!({"path": "yes"})))
                    .with_step(WorkflowStep::tool("no", "record").with_params(json!({"path": "no"}))),
            )
            .await
            .unwrap();

        let result = engine
            .execute("route", inputs(json!({"result": true})))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.results["check"], json!(true));
        assert!(result.results.contains_key("yes"));
        assert!(!result.results.contains_key("no"));

        let result = engine
            .execute("route", inputs(json!({"result": false})))
            .await
            .unwrap();
        assert!(result.results.contains_key("no"));
        assert!(!result.results.contains_key("yes"));

        let paths: Vec<Value> = calls.lock().unwrap().iter().map(|p| p["path"].clone()).collect();
        assert_eq!(paths, vec![json!("yes"), json!("no")]);
    }

    #[tokio::test]
    async fn test_condition_reads_variable_not_previous_step() {
        let (engine, _) = engine_with_recorder().await;
        engine
            .register_workflow(
                WorkflowDefinition::new("wf", "WF")
                    .with_step(WorkflowStep::tool("first", "record").then("check"))
                    .with_step(WorkflowStep::condition("check", "result.success === true")),
            )
            .await
            .unwrap();

        let result = engine.execute("wf", HashMap::new()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.results["check"], json!(false));
    }

    #[tokio::test]
    async fn test_tool_params_resolve_templates() {
        let (engine, calls) = engine_with_recorder().await;
        engine
            .register_workflow(
                WorkflowDefinition::new("tmpl", "Templates")
                    .with_step(
                        WorkflowStep::tool("first", "record")
                            .with_params(json!({"host": "{{server.host}}", "port": 22}))
                            .then("second"),
                    )
                    .with_step(
                        WorkflowStep::tool("second", "record")
                            .with_params(json!({"prev": "{{steps.first.echo.host}}"})),
                    ),
            )
            .await
            .unwrap();

        let result = engine
            .execute("tmpl", inputs(json!({"server": {"host": "db01"}})))
            .await
            .unwrap();
        assert!(result.success);

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0], json!({"host": "db01", "port": 22}));
        assert_eq!(calls[1], json!({"prev": "db01"}));
    }

    #[tokio::test]
    async fn test_loop_runs_body_per_item() {
        let (engine, calls) = engine_with_recorder().await;
        engine
            .register_workflow(
                WorkflowDefinition::new("each", "Each")
                    .with_step(WorkflowStep::for_each("loop", "hosts", "visit").then("after"))
                    .with_step(WorkflowStep::tool("visit", "record").with_params(json!({"host": "{{item}}"})))
                    .with_step(WorkflowStep::tool("after", "record").with_params(json!({"done": true}))),
            )
            .await
            .unwrap();

        let result = engine
            .execute("each", inputs(json!({"hosts": ["a", "b", "c"]})))
            .await
            .unwrap();
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.results["loop"].as_array().unwrap().len(), 3);
        let order: Vec<&String> = result.results.keys().collect();
        assert_eq!(order, vec!["loop", "after"]);

        let hosts: Vec<Value> = calls.lock().unwrap().iter().map(|p| p["host"].clone()).collect();
        assert_eq!(hosts, vec![json!("a"), json!("b"), json!("c"), Value::Null]);
    }

    #[tokio::test]
    async fn test_loop_over_non_array_keeps_partial_results() {
        let (engine, _) = engine_with_recorder().await;
        engine
            .register_workflow(
                WorkflowDefinition::new("bad", "Bad loop")
                    .with_step(WorkflowStep::tool("prepare", "record").then("loop"))
                    .with_step(WorkflowStep::for_each("loop", "items", "body"))
                    .with_step(WorkflowStep::tool("body", "record")),
            )
            .await
            .unwrap();

        let result = engine
            .execute("bad", inputs(json!({"items": "not-a-list"})))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("not an array"));
        let order: Vec<&String> = result.results.keys().collect();
        assert_eq!(order, vec!["prepare"]);
    }

    #[tokio::test]
    async fn test_unknown_tool_fails_run() {
        let engine = WorkflowEngine::new();
        engine
            .register_workflow(
                WorkflowDefinition::new("wf", "WF").with_step(WorkflowStep::tool("s", "missing")),
            )
            .await
            .unwrap();

        let result = engine.execute("wf", HashMap::new()).await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Unknown tool"));
        assert!(result.results.is_empty());
    }

    #[tokio::test]
    async fn test_tool_fault_is_reported() {
        let (engine, _) = engine_with_recorder().await;
        engine
            .register_workflow(
                WorkflowDefinition::new("wf", "WF")
                    .with_step(WorkflowStep::tool("a", "record").then("b"))
                    .with_step(WorkflowStep::tool("b", "fail").then("c"))
                    .with_step(WorkflowStep::tool("c", "record")),
            )
            .await
            .unwrap();

        let result = engine.execute("wf", HashMap::new()).await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("disk full"));
        assert!(result.results.contains_key("a"));
        assert!(!result.results.contains_key("c"));
    }

    #[tokio::test]
    async fn test_empty_workflow_and_dangling_next() {
        let (engine, _) = engine_with_recorder().await;
        engine
            .register_workflow(WorkflowDefinition::new("empty", "Empty"))
            .await
            .unwrap();
        engine
            .register_workflow(
                WorkflowDefinition::new("dangling", "Dangling")
                    .with_step(WorkflowStep::tool("a", "record").then("nowhere")),
            )
            .await
            .unwrap();

        let result = engine.execute("empty", HashMap::new()).await.unwrap();
        assert!(result.success);
        assert!(result.results.is_empty());

        let result = engine.execute("dangling", HashMap::new()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.results.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_workflow_not_registered() {
        let engine = WorkflowEngine::new();
        let err = engine
            .register_workflow(
                WorkflowDefinition::new("wf", "WF").with_step(WorkflowStep::for_each("l", "xs", "missing")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidWorkflow(_)));
        assert!(engine.get_workflow("wf").await.is_none());
    }

    #[tokio::test]
    async fn test_self_looping_body_rejected_and_bounded() {
        let (engine, _) = engine_with_recorder().await;
        let recursive = WorkflowDefinition::new("spin", "Spin")
            .with_step(WorkflowStep::for_each("loop", "items", "loop"));

        let err = engine.register_workflow(recursive.clone()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidWorkflow(_)));

        let execution = WorkflowExecution::new(
            Arc::new(recursive),
            inputs(json!({"items": [1]})),
            Arc::clone(engine.tools()),
            Arc::clone(engine.events()),
        );
        let result = execution.run().await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("nested deeper"));
    }

    #[tokio::test]
    async fn test_events_delivered_in_order() {
        let (engine, _) = engine_with_recorder().await;
        engine
            .register_workflow(
                WorkflowDefinition::new("wf", "WF")
                    .with_step(WorkflowStep::tool("a", "record").then("b"))
                    .with_step(WorkflowStep::tool("b", "record")),
            )
            .await
            .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        engine
            .events()
            .subscribe(move |event: &WorkflowEvent| {
                let label = match event {
                    WorkflowEvent::WorkflowStarted { .. } => "start".to_string(),
                    WorkflowEvent::StepStarted { step_id, .. } => format!("step:{}", step_id),
                    WorkflowEvent::StepCompleted { step_id, .. } => format!("done:{}", step_id),
                    WorkflowEvent::WorkflowCompleted { success, .. } => format!("end:{}", success),
                };
                sink.lock().unwrap().push(label);
                Ok(())
            })
            .await;

        let result = engine.execute("wf", HashMap::new()).await.unwrap();
        assert!(result.success);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["start", "step:a", "done:a", "step:b", "done:b", "end:true"]
        );
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_isolated() {
        let engine = Arc::new(WorkflowEngine::new());
        engine
            .register_tool(
                FnTool::new("slow", "", |params| async move {
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    Ok(params)
                })
                .boxed(),
            )
            .await;
        engine
            .register_workflow(
                WorkflowDefinition::new("wf", "WF")
                    .with_step(WorkflowStep::tool("s", "slow").with_params(json!({"who": "{{who}}"}))),
            )
            .await
            .unwrap();

        let a = engine.execute("wf", inputs(json!({"who": "a"})));
        let b = engine.execute("wf", inputs(json!({"who": "b"})));
        let (a, b) = tokio::join!(a, b);
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.results["s"], json!({"who": "a"}));
        assert_eq!(b.results["s"], json!({"who": "b"}));
        assert_ne!(a.execution_id, b.execution_id);
    }

    #[tokio::test]
    async fn test_execute_tool_directly() {
        let (engine, _) = engine_with_recorder().await;
        let value = engine.execute_tool("record", json!({"x": 1})).await.unwrap();
        assert_eq!(value["echo"]["x"], 1);
        assert!(matches!(
            engine.execute_tool("nope", json!({})).await,
            Err(Error::UnknownTool(_))
        ));
    }
}
