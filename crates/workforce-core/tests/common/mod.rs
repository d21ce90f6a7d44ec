#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};

use workforce_core::completion::{ChatBlock, ChatRole};
use workforce_core::tools::ParamKind;
use workforce_core::{
    ChatMessage, Completion, CompletionClient, CompletionError, ModelParameters, ToolCall,
    ToolRegistry, ToolSchema,
};

/// Mock completion service: replays responses, then repeats the last one
pub struct MockClient {
    responses: Mutex<VecDeque<Completion>>,
    last: Mutex<Option<Completion>>,
    histories: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockClient {
    pub fn new(responses: Vec<Completion>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            last: Mutex::new(None),
            histories: Mutex::new(Vec::new()),
        })
    }

    pub fn answering(text: &str) -> Arc<Self> {
        Self::new(vec![Completion::final_answer(text)])
    }

    pub fn calls(&self) -> usize {
        self.histories.lock().unwrap().len()
    }

    pub fn last_history(&self) -> Vec<ChatMessage> {
        self.histories.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl CompletionClient for MockClient {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-1"
    }

    async fn complete(
        &self,
        _system_prompt: &str,
        history: &[ChatMessage],
        _tools: &[ToolSchema],
        _params: &ModelParameters,
    ) -> Result<Completion, CompletionError> {
        self.histories.lock().unwrap().push(history.to_vec());
        let next = self.responses.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(response) => {
                *last = Some(response.clone());
                Ok(response)
            }
            None => last
                .clone()
                .ok_or_else(|| CompletionError::MalformedResponse("no scripted response".into())),
        }
    }
}

/// A tool call the model "requests"
pub fn call(id: &str, name: &str, args: Value) -> ToolCall {
    ToolCall::new(id, name, args)
}

/// Registry with `lookup` (echoes `key`, requires it) and `explode` (always errors),
/// counting how often each handler actually ran
pub fn counting_registry(counter: Arc<AtomicUsize>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    let lookups = counter.clone();
    registry.register_fn(
        ToolSchema::new("lookup", "Look up a key").required("key", ParamKind::String, "Key"),
        move |args| {
            let lookups = lookups.clone();
            async move {
                lookups.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"key": args.get("key").cloned().unwrap_or(Value::Null)}))
            }
        },
    );

    let explosions = counter;
    registry.register_fn(ToolSchema::new("explode", "Always fails"), move |_args| {
        let explosions = explosions.clone();
        async move {
            explosions.fetch_add(1, Ordering::SeqCst);
            Err::<Value, _>(anyhow::anyhow!("backend unavailable"))
        }
    });

    registry
}

/// Tool results in `history`, in order, as (call id, is_error, content)
pub fn tool_results(history: &[ChatMessage]) -> Vec<(String, bool, String)> {
    history
        .iter()
        .filter(|m| m.role == ChatRole::Tool)
        .flat_map(|m| m.content.iter())
        .filter_map(|block| match block {
            ChatBlock::ToolResult {
                tool_call_id,
                is_error,
                content,
                ..
            } => Some((tool_call_id.clone(), *is_error, content.clone())),
            _ => None,
        })
        .collect()
}
