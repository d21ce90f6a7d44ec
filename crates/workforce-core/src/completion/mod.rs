//! Provider-agnostic completion client
//!
//! The agent runtime only sees [`CompletionClient`]: a system prompt, the
//! conversation so far and the available tool schemas go in; either a final
//! answer or a batch of tool calls comes out.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::debug;

use crate::tools::{ToolCall, ToolResult, ToolSchema};

pub mod anthropic;
pub mod openai;
pub mod retry;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiClient;
pub use retry::RetryPolicy;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    /// Result of one tool call, fed back to the model
    Tool,
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// A single block within a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatBlock {
    Text {
        text: String,
    },
    ToolCall {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_call_id: String,
        name: String,
        content: String,
        is_error: bool,
    },
}

/// Provider-agnostic chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Vec<ChatBlock>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: vec![ChatBlock::Text { text: text.into() }],
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: vec![ChatBlock::Text { text: text.into() }],
        }
    }

    /// The assistant turn that requested `calls`
    pub fn tool_calls(calls: &[ToolCall]) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: calls
                .iter()
                .map(|c| ChatBlock::ToolCall {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    input: Value::Object(c.arguments.clone()),
                })
                .collect(),
        }
    }

    /// The result of `call`, with `content` as the model-visible payload
    pub fn tool_result(call: &ToolCall, result: &ToolResult, content: String) -> Self {
        Self {
            role: ChatRole::Tool,
            content: vec![ChatBlock::ToolResult {
                tool_call_id: call.id.clone(),
                name: call.name.clone(),
                content,
                is_error: !result.success,
            }],
        }
    }

    /// Concatenated text blocks
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ChatBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// What the model wants next
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    FinalAnswer { text: String },
    /// Zero or more calls, to be run in order
    RequestedTools { calls: Vec<ToolCall> },
}

/// Token usage from one or more API calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// One completion response
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub outcome: CompletionOutcome,
    pub usage: TokenUsage,
}

impl Completion {
    pub fn final_answer(text: impl Into<String>) -> Self {
        Self {
            outcome: CompletionOutcome::FinalAnswer { text: text.into() },
            usage: TokenUsage::default(),
        }
    }

    pub fn tools(calls: Vec<ToolCall>) -> Self {
        Self {
            outcome: CompletionOutcome::RequestedTools { calls },
            usage: TokenUsage::default(),
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }

    /// Classify provider output: any tool call means the model wants tools
    pub(crate) fn from_parts(texts: Vec<String>, calls: Vec<ToolCall>, usage: TokenUsage) -> Self {
        let outcome = if calls.is_empty() {
            CompletionOutcome::FinalAnswer {
                text: texts.join("\n"),
            }
        } else {
            CompletionOutcome::RequestedTools { calls }
        };
        Self { outcome, usage }
    }
}

/// Sampling settings sent with every completion request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// The completion service could not produce a usable response
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompletionError {
    #[error("Completion service unreachable: {0}")]
    Unreachable(String),

    #[error("Completion service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed completion response: {0}")]
    MalformedResponse(String),

    #[error("Completion request timed out after {0:?}")]
    Timeout(Duration),
}

impl CompletionError {
    /// Transport failures, timeouts, malformed payloads, rate limits and server
    /// errors may succeed on retry. Other client errors will not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unreachable(_) | Self::MalformedResponse(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

/// Trait that all completion services implement
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Human-readable provider name (e.g. "anthropic", "openai")
    fn provider_name(&self) -> &str;

    /// Model identifier (e.g. "gpt-4o")
    fn model(&self) -> &str;

    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        tools: &[ToolSchema],
        params: &ModelParameters,
    ) -> Result<Completion, CompletionError>;
}

/// Send a prepared request and decode the JSON body, mapping every failure onto `CompletionError`
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    provider: &str,
) -> Result<T, CompletionError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            CompletionError::Timeout(Duration::ZERO)
        } else {
            CompletionError::Unreachable(format!("{}: {}", provider, e))
        }
    })?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| CompletionError::Unreachable(format!("{}: {}", provider, e)))?;

    if !status.is_success() {
        return Err(CompletionError::Status {
            status: status.as_u16(),
            body,
        });
    }

    debug!("{} response: {} bytes", provider, body.len());
    serde_json::from_str(&body)
        .map_err(|e| CompletionError::MalformedResponse(format!("{}: {}", provider, e)))
}

pub(crate) fn build_http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    use anyhow::Context;
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}
