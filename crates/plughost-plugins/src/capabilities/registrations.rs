//! Engine registrations made through plugin contexts
//!
//! Tools, workflows, agents and prompt templates a plugin registers are
//! recorded against its ID so they can be withdrawn when it unloads. A later
//! registration under the same name by another plugin takes ownership.

use plughost_core::Result;
use plughost_tools::{BoxedTool, ToolDefinition};
use plughost_workflows::{
    AgentDefinition, ChatOptions, ChatResponse, PromptTemplateDefinition, WorkflowDefinition,
    WorkflowEngine, WorkflowResult,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// What kind of engine entry a registration is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationKind {
    Tool,
    Workflow,
    Agent,
    PromptTemplate,
}

/// Who registered what
#[derive(Default)]
pub struct RegistrationLedger {
    owners: RwLock<HashMap<(RegistrationKind, String), String>>,
}

impl RegistrationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, owner: &str, kind: RegistrationKind, name: &str) {
        self.owners
            .write()
            .await
            .insert((kind, name.to_string()), owner.to_string());
    }

    pub async fn owner_of(&self, kind: RegistrationKind, name: &str) -> Option<String> {
        self.owners
            .read()
            .await
            .get(&(kind, name.to_string()))
            .cloned()
    }

    /// Forget one entry if `owner` holds it
    pub async fn forget(&self, owner: &str, kind: RegistrationKind, name: &str) -> bool {
        let mut owners = self.owners.write().await;
        let key = (kind, name.to_string());
        if owners.get(&key).map_or(false, |o| o == owner) {
            owners.remove(&key);
            true
        } else {
            false
        }
    }

    /// Entries held by `owner`, sorted
    pub async fn owned_by(&self, owner: &str) -> Vec<(RegistrationKind, String)> {
        let owners = self.owners.read().await;
        let mut owned: Vec<_> = owners
            .iter()
            .filter(|(_, o)| o.as_str() == owner)
            .map(|(key, _)| key.clone())
            .collect();
        owned.sort();
        owned
    }

    /// Remove and return every entry held by `owner`
    pub async fn take(&self, owner: &str) -> Vec<(RegistrationKind, String)> {
        let mut owners = self.owners.write().await;
        let mut taken: Vec<_> = owners
            .iter()
            .filter(|(_, o)| o.as_str() == owner)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &taken {
            owners.remove(key);
        }
        taken.sort();
        taken
    }
}

/// Withdraw everything `owner` registered from the engine
pub(crate) async fn release(ledger: &RegistrationLedger, engine: &WorkflowEngine, owner: &str) -> usize {
    let taken = ledger.take(owner).await;
    for (kind, name) in &taken {
        match kind {
            RegistrationKind::Tool => {
                engine.unregister_tool(name).await;
            }
            RegistrationKind::Workflow => {
                engine.unregister_workflow(name).await;
            }
            RegistrationKind::Agent => {
                engine.agents().unregister_agent(name).await;
            }
            RegistrationKind::PromptTemplate => {
                engine.agents().unregister_prompt_template(name).await;
            }
        }
    }
    if !taken.is_empty() {
        debug!(plugin_id = %owner, count = taken.len(), "Withdrew engine registrations");
    }
    taken.len()
}

/// Tool registry handle for one plugin
#[derive(Clone)]
pub struct ToolsApi {
    plugin_id: String,
    engine: Arc<WorkflowEngine>,
    ledger: Arc<RegistrationLedger>,
}

impl ToolsApi {
    pub(crate) fn new(plugin_id: &str, engine: Arc<WorkflowEngine>, ledger: Arc<RegistrationLedger>) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            engine,
            ledger,
        }
    }

    /// Register a tool with the workflow engine, replacing any with the same name
    pub async fn register(&self, tool: BoxedTool) {
        let name = tool.name().to_string();
        self.engine.register_tool(tool).await;
        self.ledger
            .record(&self.plugin_id, RegistrationKind::Tool, &name)
            .await;
    }

    /// Unregister a tool this plugin registered
    pub async fn unregister(&self, name: &str) -> bool {
        if self
            .ledger
            .forget(&self.plugin_id, RegistrationKind::Tool, name)
            .await
        {
            self.engine.unregister_tool(name).await
        } else {
            false
        }
    }

    pub async fn list(&self) -> Vec<ToolDefinition> {
        self.engine.list_tools().await
    }

    pub async fn execute(&self, name: &str, params: Value) -> Result<Value> {
        self.engine.execute_tool(name, params).await
    }
}

/// Agent, workflow and prompt handle for one plugin
#[derive(Clone)]
pub struct AgentApi {
    plugin_id: String,
    engine: Arc<WorkflowEngine>,
    ledger: Arc<RegistrationLedger>,
}

impl AgentApi {
    pub(crate) fn new(plugin_id: &str, engine: Arc<WorkflowEngine>, ledger: Arc<RegistrationLedger>) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            engine,
            ledger,
        }
    }

    pub async fn register_tool(&self, tool: BoxedTool) {
        ToolsApi::new(&self.plugin_id, self.engine.clone(), self.ledger.clone())
            .register(tool)
            .await
    }

    pub async fn register_agent(&self, agent: AgentDefinition) {
        let id = agent.id.clone();
        self.engine.register_agent(agent).await;
        self.ledger
            .record(&self.plugin_id, RegistrationKind::Agent, &id)
            .await;
    }

    /// Register a workflow; invalid definitions are rejected
    pub async fn register_workflow(&self, workflow: WorkflowDefinition) -> Result<()> {
        let id = workflow.id.clone();
        self.engine.register_workflow(workflow).await?;
        self.ledger
            .record(&self.plugin_id, RegistrationKind::Workflow, &id)
            .await;
        Ok(())
    }

    pub async fn register_prompt_template(&self, template: PromptTemplateDefinition) {
        let id = template.id.clone();
        self.engine.register_prompt_template(template).await;
        self.ledger
            .record(&self.plugin_id, RegistrationKind::PromptTemplate, &id)
            .await;
    }

    pub async fn chat(&self, agent_id: &str, prompt: &str, options: ChatOptions) -> Result<ChatResponse> {
        self.engine.chat(agent_id, prompt, options).await
    }

    pub async fn execute_workflow(&self, workflow_id: &str, inputs: HashMap<String, Value>) -> Result<WorkflowResult> {
        self.engine.execute(workflow_id, inputs).await
    }

    pub async fn render_prompt(&self, template_id: &str, variables: &Map<String, Value>) -> Result<String> {
        self.engine.render_prompt(template_id, variables).await
    }

    pub async fn list_agents(&self) -> Vec<AgentDefinition> {
        self.engine.agents().list_agents().await
    }

    pub async fn list_workflows(&self) -> Vec<WorkflowDefinition> {
        self.engine.list_workflows().await
    }

    pub async fn list_prompt_templates(&self) -> Vec<PromptTemplateDefinition> {
        self.engine.agents().list_prompt_templates().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plughost_tools::FnTool;
    use serde_json::json;

    fn echo(name: &str) -> BoxedTool {
        FnTool::sync(name, "echo", |params| Ok(params)).boxed()
    }

    #[tokio::test]
    async fn test_release_withdraws_owned_entries() {
        let engine = Arc::new(WorkflowEngine::new());
        let ledger = Arc::new(RegistrationLedger::new());
        let a = AgentApi::new("a", engine.clone(), ledger.clone());

        a.register_tool(echo("a.echo")).await;
        a.register_agent(AgentDefinition::new("helper", "Helper")).await;
        a.register_workflow(
            WorkflowDefinition::new("wf", "Flow")
                .with_step(plughost_workflows::WorkflowStep::tool("s1", "a.echo")),
        )
        .await
        .unwrap();

        assert_eq!(ledger.owned_by("a").await.len(), 3);
        assert_eq!(release(&ledger, &engine, "a").await, 3);
        assert!(engine.list_tools().await.is_empty());
        assert!(engine.get_workflow("wf").await.is_none());
        assert!(a.list_agents().await.is_empty());
    }

    #[tokio::test]
    async fn test_reregistration_moves_ownership() {
        let engine = Arc::new(WorkflowEngine::new());
        let ledger = Arc::new(RegistrationLedger::new());
        let a = ToolsApi::new("a", engine.clone(), ledger.clone());
        let b = ToolsApi::new("b", engine.clone(), ledger.clone());

        a.register(echo("shared")).await;
        b.register(echo("shared")).await;
        assert_eq!(
            ledger.owner_of(RegistrationKind::Tool, "shared").await.as_deref(),
            Some("b")
        );

        // a no longer owns it, so neither unregister nor release touch it
        assert!(!a.unregister("shared").await);
        release(&ledger, &engine, "a").await;
        assert_eq!(b.execute("shared", json!({"x": 1})).await.unwrap(), json!({"x": 1}));
        assert!(b.unregister("shared").await);
    }
}
