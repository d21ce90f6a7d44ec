//! Lead management tools

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use super::{ParamKind, ToolBackends, ToolHandler, ToolRegistry, ToolSchema, str_arg};
use crate::stores::{Lead, LeadActivity, LeadStatus, LeadStore};

pub fn register(registry: &mut ToolRegistry, backends: &ToolBackends) {
    registry.register(Arc::new(GetLeadInfoTool::new(backends.leads.clone())));
    registry.register(Arc::new(UpdateLeadStatusTool::new(backends.leads.clone())));
    registry.register(Arc::new(ScoreLeadTool::new(backends.leads.clone())));
    registry.register(Arc::new(AssignLeadTool::new(backends.leads.clone())));
    registry.register(Arc::new(CreateLeadNoteTool::new(backends.leads.clone())));
}

fn not_found(lead_id: &str) -> anyhow::Error {
    anyhow!("Lead {} not found", lead_id)
}

/// Score a lead on contact details, budget and move-in timeline (0 to 100)
pub fn compute_score(lead: &Lead, today: NaiveDate) -> (u32, Vec<&'static str>) {
    let mut score = 0;
    let mut factors = Vec::new();

    if lead.email.as_deref().is_some_and(|e| !e.is_empty()) {
        score += 20;
        factors.push("email_provided");
    }
    if lead.phone.as_deref().is_some_and(|p| !p.is_empty()) {
        score += 20;
        factors.push("phone_provided");
    }
    if lead.budget_min.is_some() && lead.budget_max.is_some() {
        score += 25;
        factors.push("budget_specified");
    }
    if let Some(move_in) = lead.move_in_date {
        score += 20;
        factors.push("move_in_date_set");
        let days_until = (move_in - today).num_days();
        if (1..=30).contains(&days_until) {
            score += 15;
            factors.push("urgent_timeline");
        }
    }
    (score, factors)
}

/// Tool: fetch a lead's profile
pub struct GetLeadInfoTool {
    leads: Arc<dyn LeadStore>,
}

impl GetLeadInfoTool {
    pub fn new(leads: Arc<dyn LeadStore>) -> Self {
        Self { leads }
    }
}

#[async_trait]
impl ToolHandler for GetLeadInfoTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "get_lead_info",
            "Get a lead's contact details, status, score, budget and move-in preferences.",
        )
        .required("lead_id", ParamKind::String, "ID of the lead")
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
        let lead_id = str_arg(&args, "lead_id")?;
        let lead = self.leads.get(lead_id).await?.ok_or_else(|| not_found(lead_id))?;
        serde_json::to_value(lead).context("Failed to serialize lead")
    }
}

/// Tool: move a lead to another funnel status
pub struct UpdateLeadStatusTool {
    leads: Arc<dyn LeadStore>,
}

impl UpdateLeadStatusTool {
    pub fn new(leads: Arc<dyn LeadStore>) -> Self {
        Self { leads }
    }
}

#[async_trait]
impl ToolHandler for UpdateLeadStatusTool {
    fn schema(&self) -> ToolSchema {
        let statuses: Vec<&str> = LeadStatus::ALL.iter().map(|s| s.as_str()).collect();
        ToolSchema::new("update_lead_status", "Update a lead's status in the leasing funnel.")
            .required("lead_id", ParamKind::String, "ID of the lead")
            .required("status", ParamKind::String, "New status")
            .one_of(&statuses)
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
        let lead_id = str_arg(&args, "lead_id")?;
        let raw = str_arg(&args, "status")?;
        let status =
            LeadStatus::from_string(raw).ok_or_else(|| anyhow!("Unknown lead status: {}", raw))?;

        let previous = self
            .leads
            .get(lead_id)
            .await?
            .ok_or_else(|| not_found(lead_id))?
            .status;
        self.leads
            .update(lead_id, Box::new(move |lead| lead.status = status))
            .await?
            .ok_or_else(|| not_found(lead_id))?;

        self.leads
            .record_activity(LeadActivity::new(
                lead_id,
                "status_change",
                format!("Status changed from {} to {}", previous, status),
                json!({"old_status": previous, "new_status": status}),
            ))
            .await?;
        info!("Lead {} moved from {} to {}", lead_id, previous, status);

        Ok(json!({
            "lead_id": lead_id,
            "old_status": previous,
            "new_status": status,
            "message": format!("Lead status updated to {}", status),
        }))
    }
}

/// Tool: compute and store a lead score
pub struct ScoreLeadTool {
    leads: Arc<dyn LeadStore>,
}

impl ScoreLeadTool {
    pub fn new(leads: Arc<dyn LeadStore>) -> Self {
        Self { leads }
    }
}

#[async_trait]
impl ToolHandler for ScoreLeadTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "score_lead",
            "Calculate a lead's qualification score (0-100) from contact info, budget and move-in timeline, and save it.",
        )
        .required("lead_id", ParamKind::String, "ID of the lead")
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
        let lead_id = str_arg(&args, "lead_id")?;
        let lead = self.leads.get(lead_id).await?.ok_or_else(|| not_found(lead_id))?;
        let (score, factors) = compute_score(&lead, Utc::now().date_naive());

        self.leads
            .update(lead_id, Box::new(move |lead| lead.score = Some(score)))
            .await?
            .ok_or_else(|| not_found(lead_id))?;
        debug!("Lead {} scored {}", lead_id, score);

        Ok(json!({
            "lead_id": lead_id,
            "score": score,
            "factors": factors,
            "message": format!("Lead scored at {}/100", score),
        }))
    }
}

/// Tool: hand a lead to a leasing agent
pub struct AssignLeadTool {
    leads: Arc<dyn LeadStore>,
}

impl AssignLeadTool {
    pub fn new(leads: Arc<dyn LeadStore>) -> Self {
        Self { leads }
    }
}

#[async_trait]
impl ToolHandler for AssignLeadTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new("assign_lead", "Assign a lead to a team member.")
            .required("lead_id", ParamKind::String, "ID of the lead")
            .required("user_id", ParamKind::String, "ID of the team member")
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
        let lead_id = str_arg(&args, "lead_id")?;
        let user_id = str_arg(&args, "user_id")?.to_string();

        let previous = self
            .leads
            .get(lead_id)
            .await?
            .ok_or_else(|| not_found(lead_id))?
            .assigned_to;
        let assignee = user_id.clone();
        self.leads
            .update(lead_id, Box::new(move |lead| lead.assigned_to = Some(assignee)))
            .await?
            .ok_or_else(|| not_found(lead_id))?;

        self.leads
            .record_activity(LeadActivity::new(
                lead_id,
                "assignment",
                format!("Lead assigned to user {}", user_id),
                json!({"old_assignee": previous, "new_assignee": user_id}),
            ))
            .await?;

        Ok(json!({
            "lead_id": lead_id,
            "assigned_to": user_id,
            "previous_assignee": previous,
        }))
    }
}

/// Tool: append a timestamped note to a lead
pub struct CreateLeadNoteTool {
    leads: Arc<dyn LeadStore>,
}

impl CreateLeadNoteTool {
    pub fn new(leads: Arc<dyn LeadStore>) -> Self {
        Self { leads }
    }
}

#[async_trait]
impl ToolHandler for CreateLeadNoteTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new("create_lead_note", "Add a note to a lead's record.")
            .required("lead_id", ParamKind::String, "ID of the lead")
            .required("note", ParamKind::String, "Note text")
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
        let lead_id = str_arg(&args, "lead_id")?;
        let note = str_arg(&args, "note")?.trim().to_string();
        if note.is_empty() {
            return Err(anyhow!("Note is empty"));
        }

        let entry = format!("[{}] {}", Utc::now().format("%Y-%m-%d %H:%M:%S"), note);
        self.leads
            .update(
                lead_id,
                Box::new(move |lead| {
                    if !lead.notes.is_empty() {
                        lead.notes.push('\n');
                    }
                    lead.notes.push_str(&entry);
                }),
            )
            .await?
            .ok_or_else(|| not_found(lead_id))?;

        self.leads
            .record_activity(LeadActivity::new(
                lead_id,
                "note_added",
                "Note added to lead",
                json!({"note": note}),
            ))
            .await?;

        Ok(json!({"lead_id": lead_id, "note": note}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::InMemoryLeadStore;
    use chrono::Duration;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn complete_lead(today: NaiveDate) -> Lead {
        let mut lead = Lead::new("l1", "Dana Reyes");
        lead.email = Some("dana@example.com".into());
        lead.phone = Some("5551234567".into());
        lead.budget_min = Some(1500.0);
        lead.budget_max = Some(2000.0);
        lead.move_in_date = Some(today + Duration::days(14));
        lead
    }

    #[test]
    fn test_compute_score_full_marks() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let (score, factors) = compute_score(&complete_lead(today), today);
        assert_eq!(score, 100);
        assert_eq!(factors.len(), 5);
    }

    #[test]
    fn test_compute_score_partial() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let mut lead = complete_lead(today);
        lead.phone = None;
        lead.budget_max = None;
        lead.move_in_date = Some(today + Duration::days(45));
        let (score, factors) = compute_score(&lead, today);
        assert_eq!(score, 40);
        assert_eq!(factors, vec!["email_provided", "move_in_date_set"]);

        // A move-in date already passed earns no urgency bonus
        lead.move_in_date = Some(today);
        assert_eq!(compute_score(&lead, today).0, 40);
    }

    #[tokio::test]
    async fn test_update_status_records_activity() {
        let store = Arc::new(InMemoryLeadStore::with_leads(vec![Lead::new("l1", "Dana")]));
        let tool = UpdateLeadStatusTool::new(store.clone());

        let out = tool
            .execute(args(json!({"lead_id": "l1", "status": "qualified"})))
            .await
            .unwrap();
        assert_eq!(out["old_status"], "new");
        assert_eq!(out["new_status"], "qualified");

        let activities = store.activities("l1").await.unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].activity_type, "status_change");
    }

    #[tokio::test]
    async fn test_missing_lead_is_an_error() {
        let store = Arc::new(InMemoryLeadStore::new());
        let err = GetLeadInfoTool::new(store)
            .execute(args(json!({"lead_id": "ghost"})))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Lead ghost not found");
    }

    #[tokio::test]
    async fn test_score_is_persisted() {
        let today = Utc::now().date_naive();
        let store = Arc::new(InMemoryLeadStore::with_leads(vec![complete_lead(today)]));
        let out = ScoreLeadTool::new(store.clone())
            .execute(args(json!({"lead_id": "l1"})))
            .await
            .unwrap();
        assert_eq!(out["score"], 100);
        assert_eq!(store.get("l1").await.unwrap().unwrap().score, Some(100));
    }

    #[tokio::test]
    async fn test_notes_append() {
        let store = Arc::new(InMemoryLeadStore::with_leads(vec![Lead::new("l1", "Dana")]));
        let tool = CreateLeadNoteTool::new(store.clone());
        tool.execute(args(json!({"lead_id": "l1", "note": "Prefers mornings"})))
            .await
            .unwrap();
        tool.execute(args(json!({"lead_id": "l1", "note": "Has a dog"})))
            .await
            .unwrap();

        let notes = store.get("l1").await.unwrap().unwrap().notes;
        assert_eq!(notes.lines().count(), 2);
        assert!(notes.ends_with("Has a dog"));
    }
}
