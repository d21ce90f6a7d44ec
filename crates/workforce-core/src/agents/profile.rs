//! Specialist profiles: persona, tool set and per-agent overrides

use serde::{Deserialize, Serialize};

use crate::completion::ModelParameters;
use crate::runtime::{AgentConfiguration, DEFAULT_MAX_LOOP_ITERATIONS};
use crate::types::AgentKind;

const LEASING_PERSONA: &str = "\
You are an expert leasing consultant for a multifamily property management company. \
You qualify leads, schedule and manage property tours, follow up with prospects and \
process rental applications.

Always gather budget, move-in date and requirements before recommending next steps. \
Be professional, friendly and concise. Create urgency without being pushy. Follow \
fair housing guidelines in every interaction.

Use your tools to read and update lead records, score leads, check tour availability, \
book, move or cancel tours, send SMS and email, and log every interaction so the team \
can see what happened. Finish with a short summary of what you did and the recommended \
next step.";

const MARKETING_PERSONA: &str = "\
You are an expert marketing analyst for multifamily properties. You analyze campaign \
performance, lead sources and the leasing funnel, and recommend how to spend the \
marketing budget.

Base every recommendation on numbers: cost per lead, lead-to-tour and tour-to-lease \
conversion, cost per lease and return on ad spend. Compare channels and periods, name \
top performers and underperformers, and give specific, actionable recommendations.

Use your tools to pull lead metrics, conversion rates, campaign and source breakdowns \
and ROI, to adjust ad campaigns, to report conversions back to ad platforms and to \
draft ad copy.";

const PROPERTY_PERSONA: &str = "\
You are an expert property management assistant. You answer questions about policies, \
procedures, lease terms and compliance, and help train property staff.

Always search the knowledge base before answering and cite the documents you relied on. \
Explain policies in plain language with practical examples, and call out fair housing \
or other compliance considerations. When the documents do not cover a question, say so \
and direct the person to a supervisor.

Use your tools to search, list and read documents, retrieve answer passages and pull \
the latest unit, resident and lease records from the property management system.";

pub const LEASING_TOOLS: &[&str] = &[
    "get_lead_info",
    "update_lead_status",
    "score_lead",
    "assign_lead",
    "create_lead_note",
    "send_sms",
    "send_email",
    "log_interaction",
    "check_availability",
    "schedule_tour",
    "reschedule_tour",
    "cancel_tour",
];

pub const MARKETING_TOOLS: &[&str] = &[
    "get_lead_metrics",
    "get_conversion_rate",
    "get_campaign_performance",
    "get_property_stats",
    "get_lead_source_breakdown",
    "calculate_roi",
    "get_lead_info",
    "update_ad_campaign",
    "get_ad_campaign_insights",
    "track_ad_conversion",
    "generate_ad_copy",
];

pub const PROPERTY_TOOLS: &[&str] = &[
    "search_knowledge_base",
    "get_document",
    "answer_question",
    "list_documents",
    "sync_property_management_system",
];

/// Persona prompt for a specialist
pub fn persona(kind: AgentKind) -> &'static str {
    match kind {
        AgentKind::Leasing => LEASING_PERSONA,
        AgentKind::Marketing => MARKETING_PERSONA,
        AgentKind::Property => PROPERTY_PERSONA,
    }
}

/// Tool names a specialist may call
pub fn tools(kind: AgentKind) -> &'static [&'static str] {
    match kind {
        AgentKind::Leasing => LEASING_TOOLS,
        AgentKind::Marketing => MARKETING_TOOLS,
        AgentKind::Property => PROPERTY_TOOLS,
    }
}

/// Configurable adjustments to a specialist's built-in profile
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentProfile {
    #[serde(default)]
    pub max_loop_iterations: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Extra instructions appended to the persona
    #[serde(default)]
    pub extra_instructions: Option<String>,
    /// Built-in tools this deployment withholds from the agent
    #[serde(default)]
    pub denied_tools: Vec<String>,
}

impl AgentProfile {
    /// Check if a built-in tool stays available under this profile
    pub fn is_tool_allowed(&self, tool_name: &str) -> bool {
        !self.denied_tools.iter().any(|t| t == tool_name)
    }

    /// Build the immutable configuration for `kind`
    pub fn configuration(&self, kind: AgentKind, defaults: ModelParameters) -> AgentConfiguration {
        let mut persona_prompt = persona(kind).to_string();
        if let Some(extra) = self.extra_instructions.as_deref().filter(|s| !s.trim().is_empty()) {
            persona_prompt.push_str("\n\n");
            persona_prompt.push_str(extra.trim());
        }

        let allowed: Vec<&str> = tools(kind)
            .iter()
            .copied()
            .filter(|t| self.is_tool_allowed(t))
            .collect();

        AgentConfiguration::new(kind, persona_prompt, &allowed)
            .with_max_loop_iterations(self.max_loop_iterations.unwrap_or(DEFAULT_MAX_LOOP_ITERATIONS))
            .with_model_parameters(ModelParameters {
                temperature: self.temperature.unwrap_or(defaults.temperature),
                max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            })
    }
}
