//! Test doubles shared by the unit tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use crate::completion::{
    ChatMessage, Completion, CompletionClient, CompletionError, ModelParameters,
};
use crate::stores::{
    Document, InMemoryAdPlatform, InMemoryLeadStore, InMemoryPropertySystem, IndexedDocumentStore,
    Lead, OutboxGateway, StoreAnalytics, TourBook, TourPolicy,
};
use crate::tools::{ParamKind, ToolBackends, ToolRegistry, ToolSchema};

enum Script {
    Queue(VecDeque<Completion>),
    Always(Completion),
    Fail(CompletionError),
}

/// Completion client that replays canned responses and records what it was sent
pub struct ScriptedClient {
    script: Mutex<Script>,
    histories: Mutex<Vec<Vec<ChatMessage>>>,
    systems: Mutex<Vec<String>>,
    tool_names: Mutex<Vec<Vec<String>>>,
}

impl ScriptedClient {
    fn with_script(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            histories: Mutex::new(Vec::new()),
            systems: Mutex::new(Vec::new()),
            tool_names: Mutex::new(Vec::new()),
        }
    }

    /// Replays `responses` in order, then answers "done"
    pub fn new(responses: Vec<Completion>) -> Self {
        Self::with_script(Script::Queue(responses.into()))
    }

    pub fn always(response: Completion) -> Self {
        Self::with_script(Script::Always(response))
    }

    pub fn failing(err: CompletionError) -> Self {
        Self::with_script(Script::Fail(err))
    }

    pub fn calls(&self) -> usize {
        self.histories.lock().unwrap().len()
    }

    pub fn histories(&self) -> Vec<Vec<ChatMessage>> {
        self.histories.lock().unwrap().clone()
    }

    pub fn systems(&self) -> Vec<String> {
        self.systems.lock().unwrap().clone()
    }

    pub fn tool_names(&self) -> Vec<Vec<String>> {
        self.tool_names.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        tools: &[ToolSchema],
        _params: &ModelParameters,
    ) -> Result<Completion, CompletionError> {
        self.histories.lock().unwrap().push(history.to_vec());
        self.systems.lock().unwrap().push(system_prompt.to_string());
        self.tool_names
            .lock()
            .unwrap()
            .push(tools.iter().map(|t| t.name.clone()).collect());

        match &mut *self.script.lock().unwrap() {
            Script::Queue(queue) => Ok(queue
                .pop_front()
                .unwrap_or_else(|| Completion::final_answer("done"))),
            Script::Always(response) => Ok(response.clone()),
            Script::Fail(err) => Err(err.clone()),
        }
    }
}

/// Registry of trivial tools that echo their `text` argument
pub fn registry_with(names: &[&str]) -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for name in names {
        let tool = name.to_string();
        registry.register_fn(
            ToolSchema::new(*name, "Test tool").optional("text", ParamKind::String, "Text"),
            move |args| {
                let tool = tool.clone();
                async move { Ok::<_, anyhow::Error>(json!({"tool": tool, "args": args})) }
            },
        );
    }
    Arc::new(registry)
}

/// In-memory collaborators with one lead (`lead-1`) and one policy document
pub fn backends() -> ToolBackends {
    let mut lead = Lead::new("lead-1", "Dana Reyes");
    lead.email = Some("dana@example.com".into());
    lead.property_id = Some("prop-1".into());
    let leads = Arc::new(InMemoryLeadStore::with_leads(vec![lead]));
    let ads = Arc::new(InMemoryAdPlatform::default());
    let documents = IndexedDocumentStore::new(vec![Document {
        id: "doc-1".into(),
        title: "Pet Policy".into(),
        document_type: "policy".into(),
        property_id: None,
        content: "Two pets maximum. Pet rent is $35 per month.".into(),
        created_at: Utc::now(),
    }])
    .unwrap();

    ToolBackends {
        leads: leads.clone(),
        tours: TourBook::spawn(TourPolicy::default()),
        analytics: Arc::new(StoreAnalytics::new(leads, ads.clone())),
        documents: Arc::new(documents),
        messages: Arc::new(OutboxGateway::new()),
        ads,
        property_system: Arc::new(InMemoryPropertySystem::default()),
    }
}
