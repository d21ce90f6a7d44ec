//! workforce-core - Multi-agent orchestration for a property management workforce
//!
//! This crate provides:
//! - Intent classification and routing to specialist agents
//! - A generic tool-calling loop with bounded retries and one audit record per run
//! - Leasing, marketing and property management specialists sharing that loop
//! - OpenAI and Anthropic completion clients
//! - A schema-validated tool registry and in-memory tool collaborators

pub mod activity;
pub mod agents;
pub mod completion;
pub mod intent;
pub mod orchestrator;
pub mod runtime;
pub mod stores;
pub mod tools;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use activity::{ActivitySink, ActivityStatus, AgentActivity, InMemoryActivityLog, ToolCallRecord};
pub use agents::{AgentProfile, LeasingAgent, MarketingAgent, PropertyAgent, Workforce, WorkforceBuilder};
pub use completion::{
    AnthropicClient, ChatMessage, Completion, CompletionClient, CompletionError,
    CompletionOutcome, ModelParameters, OpenAiClient, RetryPolicy, TokenUsage,
};
pub use intent::{Classification, IntentClassifier, KeywordClassifier, ModelClassifier};
pub use orchestrator::{
    ClassifierKind, CompositeResult, Orchestrator, OrchestratorConfig, RouteOutcome, RouteResult,
};
pub use runtime::{AgentConfiguration, AgentError, AgentResponse, AgentRuntime};
pub use tools::{
    ToolBackends, ToolCall, ToolDispatchError, ToolDispatcher, ToolHandler, ToolRegistry,
    ToolResult, ToolSchema, register_builtin_tools,
};
pub use types::{AgentKind, AgentRequest, Intent};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        let _ = std::mem::size_of::<Orchestrator>();
        let _ = std::mem::size_of::<AgentRuntime>();
        let _ = std::mem::size_of::<ToolRegistry>();
        let _ = std::mem::size_of::<AgentActivity>();
        let _ = std::mem::size_of::<AgentRequest>();
    }
}
