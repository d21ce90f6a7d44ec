//! Agent activity audit trail
//!
//! Every agent invocation produces exactly one terminal [`AgentActivity`],
//! appended to an [`ActivitySink`]. Records are never mutated after they are written.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::completion::TokenUsage;
use crate::types::AgentKind;

/// Input summaries are clipped to this many characters
pub const INPUT_SUMMARY_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Started,
    Completed,
    Error,
}

impl ActivityStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "started" => Some(Self::Started),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dispatched tool call, in dispatch order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCallRecord {
    pub name: String,
    pub success: bool,
}

/// Immutable audit record for one agent invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentActivity {
    pub id: String,
    pub agent_type: AgentKind,
    pub action: String,
    pub requester_id: String,
    pub input_summary: String,
    pub result_status: ActivityStatus,
    pub tool_calls: Vec<ToolCallRecord>,
    pub related_entity_id: Option<String>,
    pub error: Option<String>,
    /// Completion calls made, i.e. loop iterations entered
    pub iterations: u32,
    pub usage: TokenUsage,
    pub timestamp: DateTime<Utc>,
}

/// Clip `text` to `INPUT_SUMMARY_CHARS` characters
pub fn summarize_input(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(INPUT_SUMMARY_CHARS) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

/// Append-only destination for activity records
#[async_trait]
pub trait ActivitySink: Send + Sync {
    async fn append(&self, activity: &AgentActivity) -> Result<()>;
}

/// Activity log held in memory, newest last
#[derive(Debug, Default)]
pub struct InMemoryActivityLog {
    records: Mutex<Vec<AgentActivity>>,
}

impl InMemoryActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<AgentActivity> {
        self.records.lock().await.clone()
    }

    /// Up to `limit` records, newest first
    pub async fn recent(&self, limit: usize) -> Vec<AgentActivity> {
        self.records
            .lock()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ActivitySink for InMemoryActivityLog {
    async fn append(&self, activity: &AgentActivity) -> Result<()> {
        debug!(
            "Activity {} ({} {}): {}",
            activity.id, activity.agent_type, activity.action, activity.result_status
        );
        self.records.lock().await.push(activity.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity(id: &str, status: ActivityStatus) -> AgentActivity {
        AgentActivity {
            id: id.into(),
            agent_type: AgentKind::Leasing,
            action: "execute".into(),
            requester_id: "system".into(),
            input_summary: "qualify lead".into(),
            result_status: status,
            tool_calls: vec![ToolCallRecord {
                name: "score_lead".into(),
                success: true,
            }],
            related_entity_id: Some("lead-1".into()),
            error: None,
            iterations: 2,
            usage: TokenUsage::default(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_summarize_input() {
        assert_eq!(summarize_input("  short  "), "short");
        let long = "é".repeat(INPUT_SUMMARY_CHARS + 5);
        let summary = summarize_input(&long);
        assert!(summary.ends_with("..."));
        assert_eq!(summary.chars().count(), INPUT_SUMMARY_CHARS + 3);
    }

    #[test]
    fn test_status_round_trip() {
        for status in [ActivityStatus::Started, ActivityStatus::Completed, ActivityStatus::Error] {
            assert_eq!(ActivityStatus::from_string(status.as_str()), Some(status));
        }
        assert!(!ActivityStatus::Started.is_terminal());
        assert!(ActivityStatus::Error.is_terminal());
    }

    #[test]
    fn test_activity_serializes_snake_case() {
        let json = serde_json::to_value(activity("a1", ActivityStatus::Completed)).unwrap();
        assert_eq!(json["agent_type"], "leasing");
        assert_eq!(json["result_status"], "completed");
        assert_eq!(json["tool_calls"][0]["name"], "score_lead");
    }

    #[tokio::test]
    async fn test_in_memory_log_recent_is_newest_first() {
        let log = InMemoryActivityLog::new();
        for id in ["a1", "a2", "a3"] {
            log.append(&activity(id, ActivityStatus::Completed)).await.unwrap();
        }
        let recent: Vec<String> = log.recent(2).await.into_iter().map(|a| a.id).collect();
        assert_eq!(recent, vec!["a3", "a2"]);
        assert_eq!(log.records().await.len(), 3);
    }
}
