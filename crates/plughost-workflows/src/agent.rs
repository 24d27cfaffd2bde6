//! Agents, prompt templates and the bounded tool-calling loop
//!
//! The model provider sits behind [`ChatModel`]; this module owns the loop
//! that feeds tool results back to it and stops after a fixed number of
//! tool-call rounds.

use async_trait::async_trait;
use plughost_core::{Error, Result};
use plughost_tools::{ToolDefinition, ToolRegistry};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Default bound on tool-call rounds per chat
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 5;

/// Reply used when the model keeps requesting tools past the bound
pub const TOOL_ROUNDS_EXHAUSTED: &str =
    "Sorry, this request needed too many tool calls. Please try a simpler request.";

/// Agent definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub system_prompt: String,
    /// Tools the agent may call; empty means all registered tools
    #[serde(default)]
    pub tools: Vec<String>,
}

impl AgentDefinition {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            system_prompt: String::new(),
            tools: Vec::new(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = prompt.to_string();
        self
    }

    pub fn with_tools(mut self, tools: &[&str]) -> Self {
        self.tools = tools.iter().map(|t| t.to_string()).collect();
        self
    }

    fn allows(&self, tool: &str) -> bool {
        self.tools.is_empty() || self.tools.iter().any(|t| t == tool)
    }
}

/// Prompt template variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptVariable {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

/// Prompt template with `{{name}}` placeholders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplateDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub template: String,
    #[serde(default)]
    pub variables: Vec<PromptVariable>,
}

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// One message of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self::plain(ChatRole::System, content)
    }

    pub fn user(content: &str) -> Self {
        Self::plain(ChatRole::User, content)
    }

    fn plain(role: ChatRole, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }
}

/// What the model produced for one completion
#[derive(Debug, Clone, PartialEq)]
pub enum ModelTurn {
    /// Final answer
    Message(String),
    /// Request to run tools before answering
    ToolCalls { content: String, calls: Vec<ToolCall> },
}

/// Language-model provider
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> anyhow::Result<ModelTurn>;
}

/// Per-chat options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatOptions {
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
    /// Earlier turns, inserted between the system prompt and the new message
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

fn default_max_tool_rounds() -> usize {
    DEFAULT_MAX_TOOL_ROUNDS
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            history: Vec::new(),
        }
    }
}

/// A tool call made during a chat, with its serialized result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub arguments: Value,
    pub result: String,
}

/// Chat outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub message: String,
    pub tool_calls: Vec<ToolCallRecord>,
    /// True if the round bound was hit and `message` is the fallback reply
    pub exhausted: bool,
}

/// Agent and prompt-template registry
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, AgentDefinition>>,
    prompts: RwLock<HashMap<String, PromptTemplateDefinition>>,
    model: RwLock<Option<Arc<dyn ChatModel>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            prompts: RwLock::new(HashMap::new()),
            model: RwLock::new(None),
        }
    }

    /// Install the model provider used by [`AgentRegistry::chat`]
    pub async fn set_chat_model(&self, model: Arc<dyn ChatModel>) {
        *self.model.write().await = Some(model);
    }

    pub async fn has_chat_model(&self) -> bool {
        self.model.read().await.is_some()
    }

    pub async fn register_agent(&self, agent: AgentDefinition) {
        debug!(agent_id = %agent.id, "Registering agent");
        self.agents.write().await.insert(agent.id.clone(), agent);
    }

    pub async fn unregister_agent(&self, id: &str) -> bool {
        self.agents.write().await.remove(id).is_some()
    }

    pub async fn get_agent(&self, id: &str) -> Option<AgentDefinition> {
        self.agents.read().await.get(id).cloned()
    }

    pub async fn list_agents(&self) -> Vec<AgentDefinition> {
        let mut agents: Vec<_> = self.agents.read().await.values().cloned().collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        agents
    }

    pub async fn register_prompt_template(&self, template: PromptTemplateDefinition) {
        debug!(template_id = %template.id, "Registering prompt template");
        self.prompts
            .write()
            .await
            .insert(template.id.clone(), template);
    }

    pub async fn unregister_prompt_template(&self, id: &str) -> bool {
        self.prompts.write().await.remove(id).is_some()
    }

    pub async fn list_prompt_templates(&self) -> Vec<PromptTemplateDefinition> {
        let mut templates: Vec<_> = self.prompts.read().await.values().cloned().collect();
        templates.sort_by(|a, b| a.id.cmp(&b.id));
        templates
    }

    /// Render a prompt template.
    ///
    /// Every required variable must be present. Each provided variable
    /// replaces its `{{name}}` placeholders; unknown placeholders are left as is.
    pub async fn render_prompt(&self, template_id: &str, variables: &Map<String, Value>) -> Result<String> {
        let template = self
            .prompts
            .read()
            .await
            .get(template_id)
            .cloned()
            .ok_or_else(|| Error::UnknownPromptTemplate(template_id.to_string()))?;

        if let Some(missing) = template
            .variables
            .iter()
            .find(|v| v.required && !variables.contains_key(&v.name))
        {
            return Err(Error::MissingPromptVariable(missing.name.clone()));
        }

        let mut rendered = template.template;
        for (name, value) in variables {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            rendered = rendered.replace(&format!("{{{{{}}}}}", name), &text);
        }
        Ok(rendered)
    }

    /// Chat with an agent, running requested tools through `tools`.
    ///
    /// At most `options.max_tool_rounds` rounds of tool calls are honoured;
    /// past that the reply is [`TOOL_ROUNDS_EXHAUSTED`]. Tool faults are fed
    /// back to the model as `{"error": ...}` payloads rather than aborting.
    pub async fn chat(
        &self,
        agent_id: &str,
        prompt: &str,
        options: ChatOptions,
        tools: &ToolRegistry,
    ) -> Result<ChatResponse> {
        let agent = self
            .get_agent(agent_id)
            .await
            .ok_or_else(|| Error::UnknownAgent(agent_id.to_string()))?;
        let model = self
            .model
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::Unavailable("no chat model configured".to_string()))?;

        let definitions: Vec<ToolDefinition> = tools
            .list()
            .await
            .into_iter()
            .filter(|d| agent.allows(&d.name))
            .collect();

        let mut messages = Vec::with_capacity(options.history.len() + 2);
        if !agent.system_prompt.is_empty() {
            messages.push(ChatMessage::system(&agent.system_prompt));
        }
        messages.extend(options.history);
        messages.push(ChatMessage::user(prompt));

        let mut records = Vec::new();
        for round in 0..options.max_tool_rounds {
            let (content, calls) = match model.complete(&messages, &definitions).await? {
                ModelTurn::Message(message) => {
                    info!(agent_id = %agent.id, rounds = round, "Chat complete");
                    return Ok(ChatResponse {
                        message,
                        tool_calls: records,
                        exhausted: false,
                    });
                }
                ModelTurn::ToolCalls { content, calls } => (content, calls),
            };

            messages.push(ChatMessage {
                role: ChatRole::Assistant,
                content,
                tool_call_id: None,
                tool_calls: calls.clone(),
            });

            for call in calls {
                let result = if agent.allows(&call.name) {
                    match tools.execute(&call.name, call.arguments.clone()).await {
                        Ok(value) => value.to_string(),
                        Err(e) => json!({ "error": e.to_string() }).to_string(),
                    }
                } else {
                    json!({ "error": format!("Tool not available to agent: {}", call.name) })
                        .to_string()
                };
                debug!(agent_id = %agent.id, tool = %call.name, "Tool call answered");

                messages.push(ChatMessage {
                    role: ChatRole::Tool,
                    content: result.clone(),
                    tool_call_id: Some(call.id.clone()),
                    tool_calls: Vec::new(),
                });
                records.push(ToolCallRecord {
                    name: call.name,
                    arguments: call.arguments,
                    result,
                });
            }
        }

        warn!(
            agent_id = %agent.id,
            max_tool_rounds = options.max_tool_rounds,
            "Tool-call bound reached"
        );
        Ok(ChatResponse {
            message: TOOL_ROUNDS_EXHAUSTED.to_string(),
            tool_calls: records,
            exhausted: true,
        })
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
