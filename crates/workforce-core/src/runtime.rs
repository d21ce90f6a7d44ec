//! Generic agent runtime: the model → tools → model loop
//!
//! One [`AgentRuntime::execute`] call walks
//! `AwaitingModel → (ExecutingTools → AwaitingModel)* → Done | Failed`,
//! with at most one completion request or tool execution in flight at a time.
//! Whatever happens, exactly one terminal [`AgentActivity`] is appended before
//! control returns to the caller.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::activity::{
    ActivitySink, ActivityStatus, AgentActivity, ToolCallRecord, summarize_input,
};
use crate::completion::{
    ChatMessage, CompletionClient, CompletionError, CompletionOutcome, ModelParameters,
    RetryPolicy, TokenUsage,
};
use crate::tools::{ToolCall, ToolDispatcher};
use crate::types::{AgentKind, AgentRequest};

pub const DEFAULT_MAX_LOOP_ITERATIONS: u32 = 10;

/// Tool output larger than this many bytes is truncated before it reaches the model
pub const MAX_TOOL_OUTPUT: usize = 100_000;

/// Action name recorded for plain `execute` calls
pub const DEFAULT_ACTION: &str = "execute";

/// Static definition of an agent. Built once, shared read-only by every invocation.
#[derive(Debug, Clone)]
pub struct AgentConfiguration {
    pub kind: AgentKind,
    pub persona_prompt: String,
    pub tool_set: BTreeSet<String>,
    pub max_loop_iterations: u32,
    pub model_parameters: ModelParameters,
}

impl AgentConfiguration {
    pub fn new(kind: AgentKind, persona_prompt: impl Into<String>, tools: &[&str]) -> Self {
        Self {
            kind,
            persona_prompt: persona_prompt.into(),
            tool_set: tools.iter().map(|t| t.to_string()).collect(),
            max_loop_iterations: DEFAULT_MAX_LOOP_ITERATIONS,
            model_parameters: ModelParameters::default(),
        }
    }

    /// Set the model-turn budget. The budget is always at least one turn.
    pub fn with_max_loop_iterations(mut self, limit: u32) -> Self {
        if limit == 0 {
            warn!("{} agent configured with 0 loop iterations, using 1", self.kind);
        }
        self.max_loop_iterations = limit.max(1);
        self
    }

    pub fn with_model_parameters(mut self, params: ModelParameters) -> Self {
        self.model_parameters = params;
        self
    }
}

/// Why an invocation ended without a final answer
#[derive(Debug, Clone, thiserror::Error)]
pub enum AgentError {
    #[error("loop limit exceeded")]
    LoopLimitExceeded { limit: u32 },

    #[error(transparent)]
    CompletionFailed(#[from] CompletionError),
}

/// Structured result of one invocation, success or failure
#[derive(Debug, Clone, Serialize)]
pub struct AgentResponse {
    pub agent: AgentKind,
    pub action: String,
    pub activity_id: String,
    pub status: ActivityStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_error"
    )]
    pub error: Option<AgentError>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub iterations: u32,
    pub usage: TokenUsage,
    /// False when the activity sink rejected the terminal record
    pub activity_recorded: bool,
}

fn serialize_error<S: Serializer>(error: &Option<AgentError>, s: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => s.serialize_str(&e.to_string()),
        None => s.serialize_none(),
    }
}

impl AgentResponse {
    pub fn is_success(&self) -> bool {
        self.status == ActivityStatus::Completed
    }

    /// The final answer, or the reason there is none
    pub fn result(&self) -> Result<&str, &AgentError> {
        match (&self.answer, &self.error) {
            (_, Some(err)) => Err(err),
            (Some(answer), None) => Ok(answer),
            (None, None) => Ok(""),
        }
    }
}

enum LoopState {
    AwaitingModel,
    ExecutingTools(Vec<ToolCall>),
    Done(String),
    Failed(AgentError),
}

/// Drives the tool-calling loop for one agent configuration
pub struct AgentRuntime {
    config: Arc<AgentConfiguration>,
    client: Arc<dyn CompletionClient>,
    tools: Arc<dyn ToolDispatcher>,
    activities: Arc<dyn ActivitySink>,
    retry: RetryPolicy,
}

impl AgentRuntime {
    pub fn new(
        config: Arc<AgentConfiguration>,
        client: Arc<dyn CompletionClient>,
        tools: Arc<dyn ToolDispatcher>,
        activities: Arc<dyn ActivitySink>,
    ) -> Self {
        Self {
            config,
            client,
            tools,
            activities,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &AgentConfiguration {
        &self.config
    }

    pub fn kind(&self) -> AgentKind {
        self.config.kind
    }

    pub async fn execute(&self, request: &AgentRequest) -> AgentResponse {
        self.execute_as(DEFAULT_ACTION, request).await
    }

    /// Run the loop, recording `action` as the activity's action name
    pub async fn execute_as(&self, action: &str, request: &AgentRequest) -> AgentResponse {
        let kind = self.config.kind;
        let limit = self.config.max_loop_iterations;
        let schemas = self.tools.schemas();
        info!(
            "{} agent handling '{}' for {} ({} tools)",
            kind,
            action,
            request.requester_id(),
            schemas.len()
        );

        let mut history = vec![ChatMessage::user(build_user_message(request))];
        let mut usage = TokenUsage::default();
        let mut tool_calls: Vec<ToolCallRecord> = Vec::new();
        let mut iterations = 0u32;
        let mut state = LoopState::AwaitingModel;

        let outcome = loop {
            state = match state {
                LoopState::AwaitingModel => {
                    if iterations >= limit {
                        warn!("{} agent exceeded {} loop iterations", kind, limit);
                        LoopState::Failed(AgentError::LoopLimitExceeded { limit })
                    } else {
                        iterations += 1;
                        debug!("{} agent loop iteration {}/{}", kind, iterations, limit);

                        let system = self.config.persona_prompt.as_str();
                        let turn = history.as_slice();
                        let tools = schemas.as_slice();
                        let params = &self.config.model_parameters;
                        let label = format!("{} completion", kind);
                        let completion = self
                            .retry
                            .run(&label, move || {
                                self.client.complete(system, turn, tools, params)
                            })
                            .await;

                        match completion {
                            Ok(completion) => {
                                usage.add(completion.usage);
                                match completion.outcome {
                                    CompletionOutcome::FinalAnswer { text } => LoopState::Done(text),
                                    CompletionOutcome::RequestedTools { calls } => {
                                        LoopState::ExecutingTools(calls)
                                    }
                                }
                            }
                            Err(e) => LoopState::Failed(AgentError::CompletionFailed(e)),
                        }
                    }
                }
                LoopState::ExecutingTools(calls) => {
                    if calls.is_empty() {
                        debug!("{} agent: model requested an empty tool batch", kind);
                    } else {
                        history.push(ChatMessage::tool_calls(&calls));
                    }

                    for call in &calls {
                        debug!("{} agent dispatching {}", kind, call.name);
                        let result = self.tools.dispatch(call).await;
                        tool_calls.push(ToolCallRecord {
                            name: call.name.clone(),
                            success: result.success,
                        });
                        let content = truncate_output(result.to_model_content());
                        history.push(ChatMessage::tool_result(call, &result, content));
                    }
                    LoopState::AwaitingModel
                }
                LoopState::Done(text) => break Ok(text),
                LoopState::Failed(err) => break Err(err),
            };
        };

        let (status, answer, error) = match outcome {
            Ok(text) => {
                info!(
                    "{} agent completed '{}' (iterations: {}, tools: {}, tokens: in={} out={})",
                    kind,
                    action,
                    iterations,
                    tool_calls.len(),
                    usage.input_tokens,
                    usage.output_tokens
                );
                (ActivityStatus::Completed, Some(text), None)
            }
            Err(err) => {
                warn!("{} agent failed '{}': {}", kind, action, err);
                (ActivityStatus::Error, None, Some(err))
            }
        };

        let activity = AgentActivity {
            id: uuid::Uuid::new_v4().to_string(),
            agent_type: kind,
            action: action.to_string(),
            requester_id: request.requester_id().to_string(),
            input_summary: summarize_input(request.raw_text()),
            result_status: status,
            tool_calls: tool_calls.clone(),
            related_entity_id: request.related_entity_id().map(str::to_string),
            error: error.as_ref().map(ToString::to_string),
            iterations,
            usage,
            timestamp: Utc::now(),
        };
        let activity_recorded = match self.activities.append(&activity).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to record activity {}: {:#}", activity.id, e);
                false
            }
        };

        AgentResponse {
            agent: kind,
            action: action.to_string(),
            activity_id: activity.id,
            status,
            answer,
            error,
            tool_calls,
            iterations,
            usage,
            activity_recorded,
        }
    }
}

/// `Context:` block followed by the task, or the bare request when there is no context
pub fn build_user_message(request: &AgentRequest) -> String {
    if request.context().is_empty() {
        return request.raw_text().to_string();
    }

    let lines: Vec<String> = request
        .context()
        .iter()
        .map(|(key, value)| match value {
            Value::String(s) => format!("{}: {}", key, s),
            other => format!("{}: {}", key, other),
        })
        .collect();
    format!("Context:\n{}\n\nTask: {}", lines.join("\n"), request.raw_text())
}

fn truncate_output(mut content: String) -> String {
    if content.len() > MAX_TOOL_OUTPUT {
        let mut cut = MAX_TOOL_OUTPUT;
        while !content.is_char_boundary(cut) {
            cut -= 1;
        }
        content.truncate(cut);
        content.push_str("\n[Output truncated]");
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::InMemoryActivityLog;
    use crate::completion::Completion;
    use crate::testing::{ScriptedClient, registry_with};
    use crate::tools::ToolResult;
    use serde_json::json;
    use std::time::Duration;

    fn runtime(client: Arc<ScriptedClient>, log: Arc<InMemoryActivityLog>, limit: u32) -> AgentRuntime {
        let config = AgentConfiguration::new(AgentKind::Leasing, "You are a leasing agent.", &["echo"])
            .with_max_loop_iterations(limit);
        AgentRuntime::new(Arc::new(config), client, registry_with(&["echo"]), log)
            .with_retry_policy(RetryPolicy::default().with_base_delay(Duration::from_millis(1)))
    }

    #[test]
    fn test_user_message_with_context() {
        let request = AgentRequest::system("Qualify this lead")
            .with_context("lead_id", "lead-1")
            .with_context("attempt", 2);
        assert_eq!(
            build_user_message(&request),
            "Context:\nlead_id: lead-1\nattempt: 2\n\nTask: Qualify this lead"
        );
        assert_eq!(build_user_message(&AgentRequest::system("hi")), "hi");
    }

    #[test]
    fn test_truncate_output_respects_char_boundaries() {
        let big = "é".repeat(MAX_TOOL_OUTPUT);
        let out = truncate_output(big);
        assert!(out.ends_with("\n[Output truncated]"));
        assert!(out.len() <= MAX_TOOL_OUTPUT + "\n[Output truncated]".len());
        assert_eq!(truncate_output("ok".into()), "ok");
    }

    #[tokio::test]
    async fn test_completion_failure_is_retried_then_recorded() {
        let client = Arc::new(ScriptedClient::failing(CompletionError::Unreachable(
            "connection refused".into(),
        )));
        let log = Arc::new(InMemoryActivityLog::new());
        let response = runtime(client.clone(), log.clone(), 5)
            .execute(&AgentRequest::system("hello"))
            .await;

        assert_eq!(response.status, ActivityStatus::Error);
        assert!(matches!(response.error, Some(AgentError::CompletionFailed(_))));
        assert_eq!(client.calls(), 3);

        let records = log.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].result_status, ActivityStatus::Error);
        assert_eq!(records[0].iterations, 1);
    }

    #[tokio::test]
    async fn test_empty_tool_batch_returns_to_model() {
        let client = Arc::new(ScriptedClient::new(vec![
            Completion::tools(vec![]),
            Completion::final_answer("done"),
        ]));
        let log = Arc::new(InMemoryActivityLog::new());
        let response = runtime(client.clone(), log, 5)
            .execute(&AgentRequest::system("hello"))
            .await;

        assert_eq!(response.result().unwrap(), "done");
        assert_eq!(response.iterations, 2);
        assert!(response.tool_calls.is_empty());
        assert_eq!(client.histories()[1].len(), 1);
    }

    #[tokio::test]
    async fn test_tool_results_follow_their_calls() {
        let client = Arc::new(ScriptedClient::new(vec![
            Completion::tools(vec![
                ToolCall::new("c1", "echo", json!({"text": "a"})),
                ToolCall::new("c2", "missing", json!({})),
            ]),
            Completion::final_answer("ok"),
        ]));
        let log = Arc::new(InMemoryActivityLog::new());
        let response = runtime(client.clone(), log, 5)
            .execute(&AgentRequest::system("hello").with_context("lead_id", "lead-9"))
            .await;

        assert!(response.is_success());
        assert_eq!(
            response.tool_calls,
            vec![
                ToolCallRecord { name: "echo".into(), success: true },
                ToolCallRecord { name: "missing".into(), success: false },
            ]
        );

        // user, assistant(tool calls), two results
        let second_turn = &client.histories()[1];
        assert_eq!(second_turn.len(), 4);
        let expected = ToolResult::failure("Unknown tool: missing").to_model_content();
        assert!(matches!(
            &second_turn[3].content[0],
            crate::completion::ChatBlock::ToolResult { tool_call_id, content, .. }
                if tool_call_id == "c2" && *content == expected
        ));
    }

    #[tokio::test]
    async fn test_zero_loop_limit_still_allows_one_turn() {
        let client = Arc::new(ScriptedClient::always(Completion::final_answer("hi there")));
        let log = Arc::new(InMemoryActivityLog::new());
        let runtime = runtime(client.clone(), log, 0);
        assert_eq!(runtime.config().max_loop_iterations, 1);

        let response = runtime.execute(&AgentRequest::system("hello")).await;
        assert_eq!(response.status, ActivityStatus::Completed);
        assert_eq!(response.result().unwrap(), "hi there");
        assert_eq!(client.calls(), 1);
    }

    struct BrokenSink;

    #[async_trait::async_trait]
    impl ActivitySink for BrokenSink {
        async fn append(&self, _activity: &AgentActivity) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("disk full"))
        }
    }

    #[tokio::test]
    async fn test_unrecorded_activity_is_reported() {
        let config = AgentConfiguration::new(AgentKind::Leasing, "You are a leasing agent.", &["echo"]);
        let client = Arc::new(ScriptedClient::always(Completion::final_answer("done")));
        let runtime = AgentRuntime::new(
            Arc::new(config),
            client,
            registry_with(&["echo"]),
            Arc::new(BrokenSink),
        );

        let response = runtime.execute(&AgentRequest::system("hello")).await;
        assert_eq!(response.status, ActivityStatus::Completed);
        assert!(!response.activity_recorded);

        let log = Arc::new(InMemoryActivityLog::new());
        let recorded = self::runtime(
            Arc::new(ScriptedClient::always(Completion::final_answer("done"))),
            log.clone(),
            3,
        )
        .execute(&AgentRequest::system("hello"))
        .await;
        assert!(recorded.activity_recorded);
        assert_eq!(log.records().await[0].id, recorded.activity_id);
    }

    #[test]
    fn test_response_serializes_error_message() {
        let response = AgentResponse {
            agent: AgentKind::Marketing,
            action: "execute".into(),
            activity_id: "a1".into(),
            status: ActivityStatus::Error,
            answer: None,
            error: Some(AgentError::LoopLimitExceeded { limit: 3 }),
            tool_calls: vec![],
            iterations: 3,
            usage: TokenUsage::default(),
            activity_recorded: true,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"], "loop limit exceeded");
        assert_eq!(json["status"], "error");
        assert!(json.get("answer").is_none());
    }
}
