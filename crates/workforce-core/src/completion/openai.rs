//! OpenAI-compatible chat completions client (GPT-4o and friends)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use super::{
    ChatBlock, ChatMessage, ChatRole, Completion, CompletionClient, CompletionError,
    ModelParameters, TokenUsage, build_http_client, send_json,
};
use crate::tools::{ToolCall, ToolSchema};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// OpenAI chat completions client
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String, base_url: String) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_http_client(Duration::from_secs(120))?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }

    /// Convert provider-agnostic messages to OpenAI wire format
    fn to_openai_messages(messages: &[ChatMessage], system: &str) -> Vec<OpenAiMessage> {
        let mut result = vec![OpenAiMessage::text("system", system)];

        for msg in messages {
            match msg.role {
                ChatRole::User => result.push(OpenAiMessage::text("user", &msg.text())),
                ChatRole::Assistant => {
                    let mut text_parts = Vec::new();
                    let mut tool_calls = Vec::new();

                    for block in &msg.content {
                        match block {
                            ChatBlock::Text { text } => text_parts.push(text.clone()),
                            ChatBlock::ToolCall { id, name, input } => {
                                tool_calls.push(OpenAiToolCall {
                                    id: id.clone(),
                                    r#type: "function".to_string(),
                                    function: OpenAiFunction {
                                        name: name.clone(),
                                        arguments: input.to_string(),
                                    },
                                });
                            }
                            ChatBlock::ToolResult { .. } => {}
                        }
                    }

                    result.push(OpenAiMessage {
                        role: "assistant".to_string(),
                        content: (!text_parts.is_empty()).then(|| text_parts.join("\n")),
                        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                        tool_call_id: None,
                    });
                }
                ChatRole::Tool => {
                    // One "tool" message per result, keyed by the call id
                    for block in &msg.content {
                        if let ChatBlock::ToolResult {
                            tool_call_id,
                            content,
                            ..
                        } = block
                        {
                            result.push(OpenAiMessage {
                                role: "tool".to_string(),
                                content: Some(content.clone()),
                                tool_calls: None,
                                tool_call_id: Some(tool_call_id.clone()),
                            });
                        }
                    }
                }
            }
        }

        result
    }

    /// Convert tool schemas to OpenAI function format
    fn to_openai_tools(tools: &[ToolSchema]) -> Vec<OpenAiToolDef> {
        tools
            .iter()
            .map(|t| OpenAiToolDef {
                r#type: "function".to_string(),
                function: OpenAiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.input_schema(),
                },
            })
            .collect()
    }

    /// Convert an OpenAI response to a completion
    fn from_openai_response(resp: OpenAiApiResponse) -> Result<Completion, CompletionError> {
        let choice = resp.choices.into_iter().next().ok_or_else(|| {
            CompletionError::MalformedResponse("OpenAI response had no choices".to_string())
        })?;

        let texts: Vec<String> = choice
            .message
            .content
            .into_iter()
            .filter(|c| !c.is_empty())
            .collect();

        let calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| decode_tool_call(tc.id, tc.function.name, &tc.function.arguments))
            .collect();

        let usage = resp.usage.map_or(TokenUsage::default(), |u| {
            TokenUsage::new(u.prompt_tokens, u.completion_tokens)
        });

        Ok(Completion::from_parts(texts, calls, usage))
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    fn provider_name(&self) -> &str {
        "openai"
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
        let url = format!("{}/v1/chat/completions", self.base_url);
        let openai_messages = Self::to_openai_messages(history, system_prompt);

        let mut body = json!({
            "model": self.model,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "messages": openai_messages,
        });

        if !tools.is_empty() {
            body["tools"] = json!(Self::to_openai_tools(tools));
            body["tool_choice"] = json!("auto");
        }

        debug!(
            "OpenAI request: model={}, messages={}, tools={}",
            self.model,
            openai_messages.len(),
            tools.len()
        );

        let request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body);
        let api_response: OpenAiApiResponse = send_json(request, "openai").await?;

        debug!(
            "OpenAI response: choices={}, finish_reason={:?}",
            api_response.choices.len(),
            api_response.choices.first().map(|c| &c.finish_reason)
        );

        Self::from_openai_response(api_response)
    }
}

// ── OpenAI wire types ──

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl OpenAiMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// Tool arguments arrive as a JSON string. An empty string means no arguments;
/// anything that is not a JSON object is kept as a malformed call.
fn decode_tool_call(id: String, name: String, raw: &str) -> ToolCall {
    if raw.trim().is_empty() {
        return ToolCall::new(id, name, Value::Object(Map::new()));
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(input) => ToolCall::new(id, name, input),
        Err(e) => ToolCall::malformed(id, name, format!("arguments are not valid JSON: {}", e)),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAiToolCall {
    id: String,
    r#type: String,
    function: OpenAiFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Clone, Serialize)]
struct OpenAiToolDef {
    r#type: String,
    function: OpenAiToolFunction,
}

#[derive(Debug, Clone, Serialize)]
struct OpenAiToolFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiApiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
