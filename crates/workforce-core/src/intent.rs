//! Intent classification
//!
//! Decides which specialist(s) a request belongs to. The keyword classifier is a
//! pure, total function: every request gets exactly one [`Intent`], with an
//! explicit fallback when nothing matches. The model-backed classifier asks the
//! completion service for a label and degrades to keywords on any failure, so
//! the orchestrator's control flow is the same whichever one is plugged in.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::completion::{
    ChatMessage, CompletionClient, CompletionOutcome, ModelParameters, RetryPolicy,
};
use crate::runtime::build_user_message;
use crate::types::{AgentKind, AgentRequest, Intent};

const LEASING_KEYWORDS: &[&str] = &[
    "lead",
    "tour",
    "schedule",
    "application",
    "prospect",
    "follow up",
    "qualify",
    "contact",
    "call",
    "text",
    "email",
    "appointment",
    "visit",
    "showing",
];

const MARKETING_KEYWORDS: &[&str] = &[
    "campaign",
    "marketing",
    "ads",
    "facebook",
    "google",
    "roi",
    "conversion",
    "analytics",
    "performance",
    "budget",
    "spend",
    "source",
    "traffic",
    "cpl",
    "cost per lead",
    "funnel",
    "metrics",
];

const PROPERTY_KEYWORDS: &[&str] = &[
    "policy",
    "procedure",
    "compliance",
    "training",
    "document",
    "lease term",
    "regulation",
    "rule",
    "process",
    "guideline",
    "handbook",
    "manual",
    "how to",
    "what is the policy",
];

/// Weight of a context key that names a domain outright
const CONTEXT_HINT_WEIGHT: u32 = 2;

fn keywords(kind: AgentKind) -> &'static [&'static str] {
    match kind {
        AgentKind::Leasing => LEASING_KEYWORDS,
        AgentKind::Marketing => MARKETING_KEYWORDS,
        AgentKind::Property => PROPERTY_KEYWORDS,
    }
}

fn context_hints(kind: AgentKind) -> &'static [&'static str] {
    match kind {
        AgentKind::Leasing => &["lead_id"],
        AgentKind::Marketing => &["campaign_id", "analytics"],
        AgentKind::Property => &["document_id", "policy"],
    }
}

/// Outcome of classifying one request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub intent: Intent,
    /// Specialists to run, in the order the classifier gave. More than one only for `composite`.
    pub agents: Vec<AgentKind>,
    /// Keyword score per domain
    pub scores: BTreeMap<AgentKind, u32>,
    /// Nothing in the request pointed anywhere; the fallback intent was used
    pub ambiguous: bool,
}

impl Classification {
    fn single(kind: AgentKind, scores: BTreeMap<AgentKind, u32>, ambiguous: bool) -> Self {
        Self {
            intent: kind.intent(),
            agents: vec![kind],
            scores,
            ambiguous,
        }
    }

    /// Build from a list of agents: one agent is that agent's intent, several are composite
    fn from_agents(mut agents: Vec<AgentKind>, scores: BTreeMap<AgentKind, u32>) -> Option<Self> {
        let mut seen = BTreeSet::new();
        agents.retain(|kind| seen.insert(*kind));
        let intent = match agents.as_slice() {
            [] => return None,
            [only] => only.intent(),
            _ => Intent::Composite,
        };
        Some(Self {
            intent,
            agents,
            scores,
            ambiguous: false,
        })
    }
}

/// Anything that can classify a request. Must never fail.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, request: &AgentRequest) -> Classification;
}

/// Deterministic keyword scoring with context hints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeywordClassifier {
    fallback: AgentKind,
    ties_as_composite: bool,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self {
            fallback: AgentKind::Leasing,
            ties_as_composite: true,
        }
    }
}

impl KeywordClassifier {
    /// `fallback` handles requests with no signal. When `ties_as_composite` is false
    /// a tie goes to the first tied agent in roster order.
    pub fn new(fallback: AgentKind, ties_as_composite: bool) -> Self {
        Self {
            fallback,
            ties_as_composite,
        }
    }

    pub fn fallback(&self) -> AgentKind {
        self.fallback
    }

    /// Score every domain: one point per distinct keyword, plus the hint weight once
    /// when any of the domain's context keys is present
    pub fn score(&self, request: &AgentRequest) -> BTreeMap<AgentKind, u32> {
        let text = normalize(request.raw_text());
        AgentKind::ALL
            .into_iter()
            .map(|kind| {
                let words = keywords(kind)
                    .iter()
                    .filter(|keyword| mentions(&text, keyword))
                    .count() as u32;
                let has_hint = context_hints(kind)
                    .iter()
                    .any(|key| hinted(request.context(), key));
                (kind, words + if has_hint { CONTEXT_HINT_WEIGHT } else { 0 })
            })
            .collect()
    }

    pub fn classify_request(&self, request: &AgentRequest) -> Classification {
        let scores = self.score(request);
        let best = scores.values().copied().max().unwrap_or(0);

        if best == 0 {
            debug!("No intent signal, falling back to {}", self.fallback);
            return Classification::single(self.fallback, scores, true);
        }

        let top: Vec<AgentKind> = scores
            .iter()
            .filter(|(_, score)| **score == best)
            .map(|(kind, _)| *kind)
            .collect();

        match top.as_slice() {
            [only] => Classification::single(*only, scores, false),
            [first, ..] if !self.ties_as_composite => {
                Classification::single(*first, scores, false)
            }
            _ => Classification {
                intent: Intent::Composite,
                agents: top,
                scores,
                ambiguous: false,
            },
        }
    }
}

#[async_trait]
impl IntentClassifier for KeywordClassifier {
    async fn classify(&self, request: &AgentRequest) -> Classification {
        self.classify_request(request)
    }
}

/// Lowercased words separated by single spaces, padded so whole-word matches can use ` kw `
fn normalize(text: &str) -> String {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    format!(" {} ", words.join(" "))
}

/// Whole-word (or phrase) match, allowing a plural `s`
fn mentions(normalized: &str, keyword: &str) -> bool {
    normalized.contains(&format!(" {keyword} ")) || normalized.contains(&format!(" {keyword}s "))
}

fn hinted(context: &Map<String, Value>, key: &str) -> bool {
    match context.get(key) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

const CLASSIFIER_PROMPT: &str = "\
You route requests for a property management company to specialist agents.

Agents:
- leasing: leads, prospects, tours, follow-ups, applications and resident communication
- marketing: campaigns, ad spend, lead sources, conversion funnels, ROI and analytics
- property_management: policies, procedures, compliance, training, documents and lease terms

Reply with ONLY the agent name. If the request clearly needs more than one agent, \
reply with their names separated by commas. No other text.";

/// Asks the completion service for a label, falling back to keywords
pub struct ModelClassifier {
    client: Arc<dyn CompletionClient>,
    keywords: KeywordClassifier,
    retry: RetryPolicy,
}

impl ModelClassifier {
    pub fn new(client: Arc<dyn CompletionClient>, keywords: KeywordClassifier) -> Self {
        Self {
            client,
            keywords,
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn ask(&self, request: &AgentRequest) -> Result<Vec<AgentKind>> {
        let history = [ChatMessage::user(build_user_message(request))];
        let params = ModelParameters {
            temperature: 0.0,
            max_tokens: 32,
        };
        let (history, params) = (&history[..], &params);
        let completion = self
            .retry
            .run("Intent classification", move || {
                self.client.complete(CLASSIFIER_PROMPT, history, &[], params)
            })
            .await
            .map_err(|e| anyhow!(e))?;

        let text = match completion.outcome {
            CompletionOutcome::FinalAnswer { text } => text,
            CompletionOutcome::RequestedTools { .. } => {
                bail!("model requested tools instead of a label")
            }
        };
        let agents = parse_labels(&text);
        if agents.is_empty() {
            bail!("unrecognized intent label: {:?}", text);
        }
        Ok(agents)
    }
}

#[async_trait]
impl IntentClassifier for ModelClassifier {
    async fn classify(&self, request: &AgentRequest) -> Classification {
        let keyword = self.keywords.classify_request(request);
        match self.ask(request).await {
            Ok(agents) => match Classification::from_agents(agents, keyword.scores.clone()) {
                Some(classification) => {
                    debug!(
                        "Model classified request as {} ({:?})",
                        classification.intent, classification.agents
                    );
                    classification
                }
                None => keyword,
            },
            Err(e) => {
                warn!("Model intent classification failed, using keywords: {}", e);
                keyword
            }
        }
    }
}

/// Agent names found in a model reply such as "marketing, leasing" or "Property management."
fn parse_labels(text: &str) -> Vec<AgentKind> {
    text.to_lowercase()
        .replace(" and ", ",")
        .split([',', '\n', ';', '/'])
        .filter_map(|label| {
            let label = label
                .trim()
                .trim_matches(|c: char| !c.is_alphanumeric())
                .replace([' ', '-'], "_");
            AgentKind::from_string(&label)
        })
        .collect()
}
