//! Shared types for workforce-core

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Which specialist handles a piece of work
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Leasing,
    Marketing,
    Property,
}

impl AgentKind {
    pub const ALL: [AgentKind; 3] = [Self::Leasing, Self::Marketing, Self::Property];

    /// Parse an agent kind from a string (e.g., from a CLI flag)
    pub fn from_string(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "leasing" => Some(Self::Leasing),
            "marketing" => Some(Self::Marketing),
            "property" | "property_management" | "property_manager" => Some(Self::Property),
            _ => None,
        }
    }

    /// The intent this agent serves
    pub fn intent(&self) -> Intent {
        match self {
            Self::Leasing => Intent::Leasing,
            Self::Marketing => Intent::Marketing,
            Self::Property => Intent::PropertyManagement,
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Leasing => write!(f, "leasing"),
            Self::Marketing => write!(f, "marketing"),
            Self::Property => write!(f, "property"),
        }
    }
}

/// Classified category of an incoming request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Leasing,
    Marketing,
    PropertyManagement,
    Composite,
}

impl Intent {
    /// The specialist serving this intent. `Composite` has no single agent.
    pub fn agent(&self) -> Option<AgentKind> {
        match self {
            Self::Leasing => Some(AgentKind::Leasing),
            Self::Marketing => Some(AgentKind::Marketing),
            Self::PropertyManagement => Some(AgentKind::Property),
            Self::Composite => None,
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "leasing" => Some(Self::Leasing),
            "marketing" => Some(Self::Marketing),
            "property" | "property_management" => Some(Self::PropertyManagement),
            "composite" => Some(Self::Composite),
            _ => None,
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Leasing => write!(f, "leasing"),
            Self::Marketing => write!(f, "marketing"),
            Self::PropertyManagement => write!(f, "property_management"),
            Self::Composite => write!(f, "composite"),
        }
    }
}

/// A natural-language request entering the workforce. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    raw_text: String,
    #[serde(default)]
    context: Map<String, Value>,
    requester_id: String,
}

/// Requester id used by the specialists' convenience operations
pub const SYSTEM_REQUESTER: &str = "system";

impl AgentRequest {
    pub fn new(raw_text: impl Into<String>, requester_id: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            context: Map::new(),
            requester_id: requester_id.into(),
        }
    }

    /// Request issued by the workforce itself rather than a person
    pub fn system(raw_text: impl Into<String>) -> Self {
        Self::new(raw_text, SYSTEM_REQUESTER)
    }

    /// Attach a context entry. Consumes the request so it stays immutable after building.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Merge a whole context map, later keys winning
    pub fn with_context_map(mut self, context: Map<String, Value>) -> Self {
        self.context.extend(context);
        self
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    pub fn requester_id(&self) -> &str {
        &self.requester_id
    }

    /// String-valued context entry, if present
    pub fn context_str(&self, key: &str) -> Option<&str> {
        self.context.get(key).and_then(|v| v.as_str())
    }

    /// The entity this request is about, used as the activity's related entity
    pub fn related_entity_id(&self) -> Option<&str> {
        ["lead_id", "property_id", "campaign_id", "document_id"]
            .iter()
            .find_map(|key| self.context_str(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_kind_from_string() {
        assert_eq!(AgentKind::from_string("leasing"), Some(AgentKind::Leasing));
        assert_eq!(AgentKind::from_string(" Marketing "), Some(AgentKind::Marketing));
        assert_eq!(AgentKind::from_string("property_management"), Some(AgentKind::Property));
        assert_eq!(AgentKind::from_string("billing"), None);
    }

    #[test]
    fn test_intent_agent_mapping() {
        assert_eq!(Intent::Leasing.agent(), Some(AgentKind::Leasing));
        assert_eq!(Intent::PropertyManagement.agent(), Some(AgentKind::Property));
        assert_eq!(Intent::Composite.agent(), None);
        for kind in AgentKind::ALL {
            assert_eq!(kind.intent().agent(), Some(kind));
        }
    }

    #[test]
    fn test_intent_serde() {
        let json = serde_json::to_string(&Intent::PropertyManagement).unwrap();
        assert_eq!(json, "\"property_management\"");
        let intent: Intent = serde_json::from_str("\"composite\"").unwrap();
        assert_eq!(intent, Intent::Composite);
    }

    #[test]
    fn test_request_context() {
        let request = AgentRequest::new("Follow up", "user-7")
            .with_context("lead_id", "lead-1")
            .with_context("attempt", 2);
        assert_eq!(request.raw_text(), "Follow up");
        assert_eq!(request.requester_id(), "user-7");
        assert_eq!(request.context_str("lead_id"), Some("lead-1"));
        assert_eq!(request.context_str("attempt"), None);
        assert_eq!(request.related_entity_id(), Some("lead-1"));
    }

    #[test]
    fn test_related_entity_prefers_lead() {
        let request = AgentRequest::system("x")
            .with_context("property_id", "prop-9")
            .with_context("lead_id", "lead-2");
        assert_eq!(request.related_entity_id(), Some("lead-2"));
        assert_eq!(AgentRequest::system("x").related_entity_id(), None);
    }
}
