//! Boundary to the hosted language model. The model receives instructions,
//! the conversation so far, and the tool schema; it answers with either one
//! tool invocation or a final spoken reply. Everything else about the model
//! is opaque to this crate.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;

use orderline_core::config::{LlmConfig, LlmProvider};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// Model-visible conversation, accumulated across the turns of one call.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatEntry {
    User { text: String },
    Assistant { text: String },
    ToolCall { name: String, arguments: Value },
    ToolResult { name: String, result: Value },
}

/// One decision from the model. Tool calls are issued one at a time; the
/// runtime executes each and feeds the result back before asking again.
#[derive(Clone, Debug, PartialEq)]
pub enum AgentStep {
    ToolCall { name: String, arguments: Value },
    Reply { text: String },
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model transport failure: {0}")]
    Transport(String),
    #[error("model returned an unusable response: {0}")]
    InvalidResponse(String),
    #[error("model configuration invalid: {0}")]
    Configuration(String),
}

#[async_trait]
pub trait AgentModel: Send + Sync {
    async fn next_step(
        &self,
        instructions: &str,
        history: &[ChatEntry],
        tools: &[ToolSchema],
    ) -> Result<AgentStep, ModelError>;
}

/// Chat-completions client. All three configured providers are reached
/// through the OpenAI-compatible `/v1/chat/completions` shape; `base_url`
/// selects the deployment.
pub struct HttpAgentModel {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    max_retries: u32,
}

impl HttpAgentModel {
    pub fn from_config(config: &LlmConfig) -> Result<Self, ModelError> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(config.provider).to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|error| ModelError::Configuration(error.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
        })
    }
}

fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => "https://api.openai.com",
        LlmProvider::Anthropic => "https://api.anthropic.com",
        LlmProvider::Ollama => "http://localhost:11434",
    }
}

#[async_trait]
impl AgentModel for HttpAgentModel {
    async fn next_step(
        &self,
        instructions: &str,
        history: &[ChatEntry],
        tools: &[ToolSchema],
    ) -> Result<AgentStep, ModelError> {
        let body = build_request_body(&self.model, instructions, history, tools);
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
            }

            let mut request = self.client.post(&url).json(&body);
            if let Some(api_key) = &self.api_key {
                request = request.bearer_auth(api_key.expose_secret());
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    let payload: Value = response
                        .json()
                        .await
                        .map_err(|error| ModelError::InvalidResponse(error.to_string()))?;
                    if !status.is_success() {
                        last_error = format!("status {status}: {payload}");
                        continue;
                    }
                    return parse_step(&payload);
                }
                Err(error) => {
                    last_error = error.to_string();
                }
            }
        }

        Err(ModelError::Transport(last_error))
    }
}

fn build_request_body(
    model: &str,
    instructions: &str,
    history: &[ChatEntry],
    tools: &[ToolSchema],
) -> Value {
    let mut messages = vec![json!({"role": "system", "content": instructions})];
    for entry in history {
        messages.push(match entry {
            ChatEntry::User { text } => json!({"role": "user", "content": text}),
            ChatEntry::Assistant { text } => json!({"role": "assistant", "content": text}),
            ChatEntry::ToolCall { name, arguments } => json!({
                "role": "assistant",
                "content": Value::Null,
                "tool_calls": [{
                    "id": format!("call-{name}"),
                    "type": "function",
                    "function": {"name": name, "arguments": arguments.to_string()},
                }],
            }),
            ChatEntry::ToolResult { name, result } => json!({
                "role": "tool",
                "tool_call_id": format!("call-{name}"),
                "content": result.to_string(),
            }),
        });
    }

    let tool_specs = tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                },
            })
        })
        .collect::<Vec<_>>();

    json!({"model": model, "messages": messages, "tools": tool_specs})
}

fn parse_step(payload: &Value) -> Result<AgentStep, ModelError> {
    let message = payload
        .pointer("/choices/0/message")
        .ok_or_else(|| ModelError::InvalidResponse("missing choices[0].message".to_string()))?;

    if let Some(tool_call) = message.pointer("/tool_calls/0/function") {
        let name = tool_call
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ModelError::InvalidResponse("tool call without a name".to_string()))?
            .to_string();
        let raw_arguments = tool_call.get("arguments").and_then(Value::as_str).unwrap_or("{}");
        let arguments = serde_json::from_str(raw_arguments).map_err(|error| {
            ModelError::InvalidResponse(format!("tool arguments are not JSON: {error}"))
        })?;
        return Ok(AgentStep::ToolCall { name, arguments });
    }

    let text = message
        .get("content")
        .and_then(Value::as_str)
        .ok_or_else(|| ModelError::InvalidResponse("reply without text content".to_string()))?;
    Ok(AgentStep::Reply { text: text.to_string() })
}

/// Deterministic model double: pops pre-scripted steps in order. Driver and
/// runtime tests use it to exercise the tool loop without a network.
#[derive(Default)]
pub struct ScriptedAgentModel {
    steps: Mutex<VecDeque<AgentStep>>,
}

impl ScriptedAgentModel {
    pub fn new(steps: Vec<AgentStep>) -> Self {
        Self { steps: Mutex::new(steps.into()) }
    }

    pub fn push(&self, step: AgentStep) {
        match self.steps.lock() {
            Ok(mut steps) => steps.push_back(step),
            Err(poisoned) => poisoned.into_inner().push_back(step),
        }
    }
}

#[async_trait]
impl AgentModel for ScriptedAgentModel {
    async fn next_step(
        &self,
        _instructions: &str,
        _history: &[ChatEntry],
        _tools: &[ToolSchema],
    ) -> Result<AgentStep, ModelError> {
        let step = match self.steps.lock() {
            Ok(mut steps) => steps.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        Ok(step.unwrap_or(AgentStep::Reply {
            text: "Is there anything else I can help you with?".to_string(),
        }))
    }
}
