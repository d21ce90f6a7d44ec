//! Tool registry and dispatch
//!
//! `ToolRegistry::dispatch` is the only path from a model-requested call to a
//! handler. It never fails: unknown names, schema violations, handler errors,
//! panics and timeouts all come back as a `ToolResult` with `success: false`.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::stores::{
    AdPlatform, AnalyticsStore, DocumentStore, LeadStore, MessageGateway, PropertySystem, TourBook,
};

pub mod analytics;
pub mod communication;
pub mod document;
pub mod integration;
pub mod lead;
pub mod scheduling;
pub mod schema;

pub use schema::{ParamKind, ParamSpec, ToolSchema};

/// Default upper bound on a single tool execution
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// A tool invocation requested by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Provider-assigned id linking the call to its result
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    /// Set when the model's arguments could not be decoded into an object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments_error: Option<String>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        match arguments {
            Value::Object(map) => Self {
                id: id.into(),
                name: name.into(),
                arguments: map,
                arguments_error: None,
            },
            _ => Self::malformed(id, name, "arguments are not a JSON object"),
        }
    }

    /// A call whose arguments were unusable. Dispatch rejects it without running the tool.
    pub fn malformed(
        id: impl Into<String>,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: Map::new(),
            arguments_error: Some(reason.into()),
        }
    }
}

/// Outcome of a dispatched tool call, always handed back to the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub success: bool,
    pub data: Value,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error: Some(error.into()),
        }
    }

    /// Serialized form placed in the conversation history
    pub fn to_model_content(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            json!({"success": false, "data": null, "error": "unserializable tool result"}).to_string()
        })
    }
}

/// Why a dispatch did not produce data. Converted into a failed `ToolResult`.
#[derive(Debug, thiserror::Error)]
pub enum ToolDispatchError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool '{0}' is not available to this agent")]
    NotPermitted(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("{reason}")]
    ExecutionFailed { tool: String, reason: String },

    #[error("Tool {0} panicked")]
    Panicked(String),

    #[error("Tool {tool} timed out after {seconds}s")]
    TimedOut { tool: String, seconds: u64 },
}

/// Individual tool handler
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn schema(&self) -> ToolSchema;

    /// Run the tool. Arguments have already been validated against `schema()`.
    async fn execute(&self, args: Map<String, Value>) -> Result<Value>;
}

/// Anything that can run tool calls for an agent
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    async fn dispatch(&self, call: &ToolCall) -> ToolResult;

    fn schemas(&self) -> Vec<ToolSchema>;
}

type ToolFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

/// Handler built from a schema and a closure
struct FnTool {
    schema: ToolSchema,
    run: Box<dyn Fn(Map<String, Value>) -> ToolFuture + Send + Sync>,
}

#[async_trait]
impl ToolHandler for FnTool {
    fn schema(&self) -> ToolSchema {
        self.schema.clone()
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
        (self.run)(args).await
    }
}

/// Registry of available tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolHandler>>,
    tool_timeout: Duration,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Register a tool handler under its schema name, replacing any previous one
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        let name = handler.schema().name;
        debug!("Registering tool: {}", name);
        if self.tools.insert(name.clone(), handler).is_some() {
            warn!("Tool {} registered twice, keeping the latest", name);
        }
    }

    /// Register a closure as a tool
    pub fn register_fn<F, Fut>(&mut self, schema: ToolSchema, f: F)
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.register(Arc::new(FnTool {
            schema,
            run: Box::new(move |args| Box::pin(f(args))),
        }));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Schemas of the named tools, skipping names that are not registered
    pub fn filter_schemas<'a>(&self, names: impl IntoIterator<Item = &'a String>) -> Vec<ToolSchema> {
        names
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|handler| handler.schema())
            .collect()
    }

    /// Validate and run a call, keeping the failure typed
    pub async fn try_dispatch(&self, call: &ToolCall) -> Result<Value, ToolDispatchError> {
        let handler = self
            .tools
            .get(&call.name)
            .cloned()
            .ok_or_else(|| ToolDispatchError::UnknownTool(call.name.clone()))?;

        if let Some(reason) = &call.arguments_error {
            return Err(ToolDispatchError::InvalidArguments {
                tool: call.name.clone(),
                reason: reason.clone(),
            });
        }

        handler
            .schema()
            .validate(&call.arguments)
            .map_err(|reason| ToolDispatchError::InvalidArguments {
                tool: call.name.clone(),
                reason,
            })?;

        // Run on its own task so a panicking handler surfaces as a JoinError
        let args = call.arguments.clone();
        let mut task = tokio::spawn(async move { handler.execute(args).await });

        match tokio::time::timeout(self.tool_timeout, &mut task).await {
            Ok(Ok(Ok(data))) => Ok(data),
            Ok(Ok(Err(e))) => Err(ToolDispatchError::ExecutionFailed {
                tool: call.name.clone(),
                reason: format!("{:#}", e),
            }),
            Ok(Err(join_err)) if join_err.is_panic() => {
                Err(ToolDispatchError::Panicked(call.name.clone()))
            }
            Ok(Err(join_err)) => Err(ToolDispatchError::ExecutionFailed {
                tool: call.name.clone(),
                reason: join_err.to_string(),
            }),
            Err(_) => {
                task.abort();
                Err(ToolDispatchError::TimedOut {
                    tool: call.name.clone(),
                    seconds: self.tool_timeout.as_secs(),
                })
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolDispatcher for ToolRegistry {
    async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        debug!("Dispatching tool: {} with arguments: {:?}", call.name, call.arguments);
        match self.try_dispatch(call).await {
            Ok(data) => {
                debug!("Tool {} succeeded", call.name);
                ToolResult::ok(data)
            }
            Err(e) => {
                warn!("Tool {} failed: {}", call.name, e);
                ToolResult::failure(e.to_string())
            }
        }
    }

    fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|h| h.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }
}

/// A view of the registry limited to one agent's tool set
#[derive(Clone)]
pub struct ScopedTools {
    inner: Arc<ToolRegistry>,
    allowed: BTreeSet<String>,
}

impl ScopedTools {
    pub fn new(registry: Arc<ToolRegistry>, allowed: BTreeSet<String>) -> Self {
        for name in &allowed {
            if !registry.contains(name) {
                warn!("Tool set names unregistered tool: {}", name);
            }
        }
        Self {
            inner: registry,
            allowed,
        }
    }

    pub fn allowed(&self) -> &BTreeSet<String> {
        &self.allowed
    }
}

#[async_trait]
impl ToolDispatcher for ScopedTools {
    async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        if !self.allowed.contains(&call.name) {
            let err = ToolDispatchError::NotPermitted(call.name.clone());
            warn!("{}", err);
            return ToolResult::failure(err.to_string());
        }
        self.inner.dispatch(call).await
    }

    fn schemas(&self) -> Vec<ToolSchema> {
        self.inner.filter_schemas(&self.allowed)
    }
}

/// Collaborators the built-in tools are wired to
#[derive(Clone)]
pub struct ToolBackends {
    pub leads: Arc<dyn LeadStore>,
    pub tours: TourBook,
    pub analytics: Arc<dyn AnalyticsStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub messages: Arc<dyn MessageGateway>,
    pub ads: Arc<dyn AdPlatform>,
    pub property_system: Arc<dyn PropertySystem>,
}

/// Register every built-in tool against the given collaborators
pub fn register_builtin_tools(registry: &mut ToolRegistry, backends: &ToolBackends) {
    lead::register(registry, backends);
    communication::register(registry, backends);
    scheduling::register(registry, backends);
    analytics::register(registry, backends);
    integration::register(registry, backends);
    document::register(registry, backends);
    debug!("Registered {} built-in tools", registry.len());
}

// Argument accessors. Handlers run after schema validation, so a missing
// required value here means the schema and the handler disagree.

pub(crate) fn str_arg<'a>(args: &'a Map<String, Value>, name: &str) -> Result<&'a str> {
    opt_str(args, name).ok_or_else(|| anyhow!("missing required argument '{}'", name))
}

pub(crate) fn opt_str<'a>(args: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    args.get(name).and_then(Value::as_str)
}

pub(crate) fn opt_u64(args: &Map<String, Value>, name: &str) -> Option<u64> {
    args.get(name).and_then(Value::as_u64)
}

pub(crate) fn opt_f64(args: &Map<String, Value>, name: &str) -> Option<f64> {
    args.get(name).and_then(Value::as_f64)
}

pub(crate) fn date_arg(args: &Map<String, Value>, name: &str) -> Result<NaiveDate> {
    let raw = str_arg(args, name)?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| anyhow!("argument '{}' must be a date in YYYY-MM-DD format", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl ToolHandler for EchoTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema::new("echo", "Echo a message").required("message", ParamKind::String, "Text")
        }

        async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
            Ok(json!({"echo": str_arg(&args, "message")?}))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new().with_timeout(Duration::from_millis(200));
        registry.register(Arc::new(EchoTool));
        registry.register_fn(ToolSchema::new("explode", "Always fails"), |_| async {
            Err::<Value, _>(anyhow!("backend unavailable"))
        });
        registry.register_fn(ToolSchema::new("panic", "Panics"), |args| async move {
            if args.is_empty() {
                panic!("handler bug");
            }
            Ok::<_, anyhow::Error>(Value::Null)
        });
        registry.register_fn(ToolSchema::new("slow", "Sleeps"), |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, anyhow::Error>(Value::Null)
        });
        registry
    }

    #[tokio::test]
    async fn test_dispatch_success() {
        let result = registry()
            .dispatch(&ToolCall::new("1", "echo", json!({"message": "hi"})))
            .await;
        assert!(result.success);
        assert_eq!(result.data["echo"], "hi");
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_dispatch_unknown_tool() {
        let result = registry().dispatch(&ToolCall::new("1", "nope", json!({}))).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Unknown tool: nope"));
    }

    #[tokio::test]
    async fn test_invalid_arguments_do_not_invoke_handler() {
        let mut registry = ToolRegistry::new();
        let invoked = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = invoked.clone();
        registry.register_fn(
            ToolSchema::new("strict", "Needs an id").required("id", ParamKind::String, "Id"),
            move |_| {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                async { Ok::<_, anyhow::Error>(Value::Null) }
            },
        );

        let result = registry.dispatch(&ToolCall::new("1", "strict", json!({"id": 5}))).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("must be of type string"));
        assert!(!invoked.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_undecodable_arguments_do_not_invoke_handler() {
        let mut registry = ToolRegistry::new();
        let invoked = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = invoked.clone();
        registry.register_fn(
            ToolSchema::new("list", "Everything optional").optional(
                "category",
                ParamKind::String,
                "Filter",
            ),
            move |_| {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                async { Ok::<_, anyhow::Error>(json!({"documents": ["all"]})) }
            },
        );

        let not_object = ToolCall::new("1", "list", json!(["pets"]));
        assert!(not_object.arguments_error.is_some());
        let result = registry.dispatch(&not_object).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("arguments are not a JSON object"));

        let garbled = ToolCall::malformed("2", "list", "arguments are not valid JSON");
        let result = registry.dispatch(&garbled).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Invalid arguments for list"));

        assert!(!invoked.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_handler_error_panic_and_timeout_are_contained() {
        let registry = registry();

        let failed = registry.dispatch(&ToolCall::new("1", "explode", json!({}))).await;
        assert_eq!(failed.error.as_deref(), Some("backend unavailable"));

        let panicked = registry.dispatch(&ToolCall::new("2", "panic", json!({}))).await;
        assert!(!panicked.success);
        assert!(panicked.error.unwrap().contains("panicked"));

        let slow = registry.dispatch(&ToolCall::new("3", "slow", json!({}))).await;
        assert!(!slow.success);
        assert!(slow.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_scoped_tools_reject_outside_set() {
        let registry = Arc::new(registry());
        let scoped = ScopedTools::new(registry, ["echo".to_string()].into_iter().collect());

        assert_eq!(scoped.schemas().len(), 1);
        let denied = scoped.dispatch(&ToolCall::new("1", "explode", json!({}))).await;
        assert!(!denied.success);
        assert!(denied.error.unwrap().contains("not available"));

        let allowed = scoped
            .dispatch(&ToolCall::new("2", "echo", json!({"message": "ok"})))
            .await;
        assert!(allowed.success);
    }

    #[test]
    fn test_model_content_is_json() {
        let content = ToolResult::failure("boom").to_model_content();
        let parsed: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["success"], false);
        assert_eq!(parsed["error"], "boom");
    }

    #[test]
    fn test_date_arg() {
        let args = json!({"date": "2025-04-01", "bad": "April 1"});
        let args = args.as_object().unwrap();
        assert_eq!(
            date_arg(args, "date").unwrap(),
            NaiveDate::from_ymd_opt(2025, 4, 1).unwrap()
        );
        assert!(date_arg(args, "bad").is_err());
    }
}
