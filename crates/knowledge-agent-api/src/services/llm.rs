use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::config::OpenAiConfig;
use crate::models::chat::{ChatMessage, ToolCall};

/// Function schema as presented to the model.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One assistant turn: either a final answer, tool call requests, or both.
#[derive(Debug, Clone)]
pub struct AssistantTurn {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

/// Chat-completion boundary driving the agent loop.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<AssistantTurn>;
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

pub struct AzureChatClient {
    http: Client,
    config: OpenAiConfig,
}

impl AzureChatClient {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_else(|_| Client::new()),
            config,
        }
    }
}

#[async_trait]
impl ChatModel for AzureChatClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<AssistantTurn> {
        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.config.endpoint, self.config.chat_deployment, self.config.api_version
        );

        let mut body = json!({
            "messages": messages,
            "temperature": 0.2,
        });
        if !tools.is_empty() {
            let tool_payloads: Vec<Value> = tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(tool_payloads);
            body["tool_choice"] = Value::String("auto".to_string());
        }

        debug!(messages = messages.len(), tools = tools.len(), "chat completion call");

        let response = self
            .http
            .post(&url)
            .header("api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .context("chat completion request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("chat completion endpoint returned {status}: {body}");
        }

        let payload: ChatCompletionResponse = response
            .json()
            .await
            .context("failed to parse chat completion response")?;

        let choice = payload
            .choices
            .into_iter()
            .next()
            .context("chat completion returned no choices")?;

        Ok(AssistantTurn {
            content: choice.message.content,
            tool_calls: choice.message.tool_calls.unwrap_or_default(),
        })
    }
}
