//! Request routing and multi-agent coordination
//!
//! The orchestrator classifies a request, hands it to the chosen specialist(s)
//! and returns their structured results. Composite work runs the selected
//! agents one after another over the same request; agents never see each
//! other's output.

use std::sync::Arc;

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::agents::Workforce;
use crate::intent::{Classification, IntentClassifier, KeywordClassifier};
use crate::runtime::AgentResponse;
use crate::types::{AgentKind, AgentRequest};

/// Which classifier the orchestrator consults
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierKind {
    #[default]
    Keyword,
    Model,
}

/// Configuration for routing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrchestratorConfig {
    /// Agent that handles requests with no intent signal
    #[serde(default = "default_fallback_agent")]
    pub fallback_agent: AgentKind,
    /// Run every tied agent instead of picking one
    #[serde(default = "default_ties_as_composite")]
    pub ties_as_composite: bool,
    #[serde(default)]
    pub classifier: ClassifierKind,
}

fn default_fallback_agent() -> AgentKind {
    AgentKind::Leasing
}

fn default_ties_as_composite() -> bool {
    true
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            fallback_agent: default_fallback_agent(),
            ties_as_composite: default_ties_as_composite(),
            classifier: ClassifierKind::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn keyword_classifier(&self) -> KeywordClassifier {
        KeywordClassifier::new(self.fallback_agent, self.ties_as_composite)
    }
}

/// Aggregated result of running several agents over one task
#[derive(Debug, Clone, Serialize)]
pub struct CompositeResult {
    /// True when at least one agent ran and all of them completed
    pub success: bool,
    pub task: String,
    pub agents_used: Vec<AgentKind>,
    /// One response per agent, in invocation order, serialized keyed by agent
    #[serde(serialize_with = "serialize_keyed")]
    pub results: Vec<AgentResponse>,
}

fn serialize_keyed<S: Serializer>(results: &[AgentResponse], s: S) -> Result<S::Ok, S::Error> {
    let mut map = s.serialize_map(Some(results.len()))?;
    for response in results {
        map.serialize_entry(&response.agent, response)?;
    }
    map.end()
}

impl CompositeResult {
    pub fn get(&self, agent: AgentKind) -> Option<&AgentResponse> {
        self.results.iter().find(|r| r.agent == agent)
    }
}

/// What routing produced: one specialist's response or a composite
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RouteOutcome {
    Single(AgentResponse),
    Composite(CompositeResult),
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteResult {
    pub classification: Classification,
    pub outcome: RouteOutcome,
}

impl RouteResult {
    pub fn is_success(&self) -> bool {
        match &self.outcome {
            RouteOutcome::Single(response) => response.is_success(),
            RouteOutcome::Composite(composite) => composite.success,
        }
    }

    /// Agents that actually ran, in order
    pub fn routed_to(&self) -> Vec<AgentKind> {
        self.responses().iter().map(|r| r.agent).collect()
    }

    pub fn responses(&self) -> Vec<&AgentResponse> {
        match &self.outcome {
            RouteOutcome::Single(response) => vec![response],
            RouteOutcome::Composite(composite) => composite.results.iter().collect(),
        }
    }
}

/// Routes requests to the workforce
pub struct Orchestrator {
    workforce: Workforce,
    classifier: Arc<dyn IntentClassifier>,
}

impl Orchestrator {
    /// Orchestrator using keyword classification per `config`
    pub fn new(workforce: Workforce, config: &OrchestratorConfig) -> Self {
        Self {
            workforce,
            classifier: Arc::new(config.keyword_classifier()),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn workforce(&self) -> &Workforce {
        &self.workforce
    }

    pub async fn classify(&self, request: &AgentRequest) -> Classification {
        self.classifier.classify(request).await
    }

    /// Classify `request` and hand it to the selected specialist(s). Never fails:
    /// every problem is reported inside the returned responses.
    pub async fn route(&self, request: &AgentRequest) -> RouteResult {
        let classification = self.classify(request).await;
        if classification.ambiguous {
            warn!(
                "No intent signal in request from {}, using fallback {}",
                request.requester_id(),
                classification.intent
            );
        }
        info!(
            "Routing request to {} ({:?})",
            classification.intent, classification.agents
        );

        let outcome = match classification.agents.as_slice() {
            [only] => RouteOutcome::Single(self.workforce.runtime(*only).execute(request).await),
            agents => RouteOutcome::Composite(self.run_agents(agents, request).await),
        };

        RouteResult {
            classification,
            outcome,
        }
    }

    /// Run each listed agent once, in order, over the same task. Duplicates are
    /// skipped after their first occurrence.
    pub async fn coordinate_multi_agent_task(
        &self,
        agents_needed: &[AgentKind],
        task_description: &str,
        context: Map<String, Value>,
    ) -> CompositeResult {
        let request = AgentRequest::system(task_description).with_context_map(context);
        self.run_agents(agents_needed, &request).await
    }

    async fn run_agents(&self, agents_needed: &[AgentKind], request: &AgentRequest) -> CompositeResult {
        let mut agents_used: Vec<AgentKind> = Vec::with_capacity(agents_needed.len());
        for agent in agents_needed {
            if agents_used.contains(agent) {
                debug!("Skipping duplicate agent {}", agent);
            } else {
                agents_used.push(*agent);
            }
        }

        if agents_used.is_empty() {
            warn!("Multi-agent task requested with no agents");
        }

        let mut results = Vec::with_capacity(agents_used.len());
        for agent in &agents_used {
            debug!("Coordinating task with {} agent", agent);
            let response = self.workforce.runtime(*agent).execute(request).await;
            if !response.is_success() {
                warn!("{} agent did not complete its part of the task", agent);
            }
            results.push(response);
        }

        let success = !results.is_empty() && results.iter().all(AgentResponse::is_success);
        info!(
            "Multi-agent task finished: {} agents, success={}",
            results.len(),
            success
        );

        CompositeResult {
            success,
            task: request.raw_text().to_string(),
            agents_used,
            results,
        }
    }
}
