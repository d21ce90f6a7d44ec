//! Anthropic messages API client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use super::{
    ChatBlock, ChatMessage, ChatRole, Completion, CompletionClient, CompletionError,
    ModelParameters, TokenUsage, build_http_client, send_json,
};
use crate::tools::{ToolCall, ToolSchema};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Anthropic messages API client
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl AnthropicClient {
    pub fn new(api_key: String, model: String, base_url: String) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_http_client(Duration::from_secs(120))?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }

    /// Convert provider-agnostic messages to Anthropic wire format.
    /// Tool results travel as user turns; consecutive turns of the same role are merged.
    fn to_anthropic_messages(messages: &[ChatMessage]) -> Vec<AnthropicMessage> {
        let mut result: Vec<AnthropicMessage> = Vec::new();

        for msg in messages {
            let role = match msg.role {
                ChatRole::User | ChatRole::Tool => "user",
                ChatRole::Assistant => "assistant",
            };
            let blocks = msg.content.iter().map(|b| match b {
                ChatBlock::Text { text } => AnthropicBlock::Text { text: text.clone() },
                ChatBlock::ToolCall { id, name, input } => AnthropicBlock::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                },
                ChatBlock::ToolResult {
                    tool_call_id,
                    content,
                    is_error,
                    ..
                } => AnthropicBlock::ToolResult {
                    tool_use_id: tool_call_id.clone(),
                    content: content.clone(),
                    is_error: *is_error,
                },
            });

            match result.last_mut() {
                Some(last) if last.role == role => last.content.extend(blocks),
                _ => result.push(AnthropicMessage {
                    role: role.to_string(),
                    content: blocks.collect(),
                }),
            }
        }

        result
    }

    fn to_anthropic_tools(tools: &[ToolSchema]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.input_schema(),
                })
            })
            .collect()
    }

    /// Convert an Anthropic response to a completion
    fn from_anthropic_response(resp: AnthropicApiResponse) -> Completion {
        let mut texts = Vec::new();
        let mut calls = Vec::new();

        for block in resp.content {
            match block {
                AnthropicBlock::Text { text } => texts.push(text),
                AnthropicBlock::ToolUse { id, name, input } => {
                    calls.push(ToolCall::new(id, name, input))
                }
                AnthropicBlock::ToolResult { .. } | AnthropicBlock::Other => {}
            }
        }

        Completion::from_parts(
            texts,
            calls,
            TokenUsage::new(resp.usage.input_tokens, resp.usage.output_tokens),
        )
    }
}

#[async_trait]
impl CompletionClient for AnthropicClient {
    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        tools: &[ToolSchema],
        params: &ModelParameters,
    ) -> Result<Completion, CompletionError> {
        let url = format!("{}/v1/messages", self.base_url);
        let anthropic_messages = Self::to_anthropic_messages(history);

        let mut body = json!({
            "model": self.model,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "system": system_prompt,
            "messages": anthropic_messages,
        });

        if !tools.is_empty() {
            body["tools"] = Value::Array(Self::to_anthropic_tools(tools));
        }

        debug!(
            "Anthropic request: model={}, messages={}, tools={}",
            self.model,
            anthropic_messages.len(),
            tools.len()
        );

        let request = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body);
        let api_response: AnthropicApiResponse = send_json(request, "anthropic").await?;

        debug!(
            "Anthropic response: blocks={}, stop_reason={:?}",
            api_response.content.len(),
            api_response.stop_reason
        );

        Ok(Self::from_anthropic_response(api_response))
    }
}

// ── Anthropic wire types ──

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
    /// Block types this client does not use (e.g. thinking)
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
struct AnthropicApiResponse {
    content: Vec<AnthropicBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Clone, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}
