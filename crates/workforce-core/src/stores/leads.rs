//! Lead store: prospects moving through the leasing funnel

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

/// Funnel position of a lead, in funnel order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    #[default]
    New,
    Contacted,
    Qualified,
    TourScheduled,
    Toured,
    ApplicationSubmitted,
    Leased,
    Lost,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 8] = [
        Self::New,
        Self::Contacted,
        Self::Qualified,
        Self::TourScheduled,
        Self::Toured,
        Self::ApplicationSubmitted,
        Self::Leased,
        Self::Lost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Contacted => "contacted",
            Self::Qualified => "qualified",
            Self::TourScheduled => "tour_scheduled",
            Self::Toured => "toured",
            Self::ApplicationSubmitted => "application_submitted",
            Self::Leased => "leased",
            Self::Lost => "lost",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    /// Position in the funnel. `Lost` leads never count as having reached a stage.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Lost => 0,
            Self::New => 1,
            Self::Contacted => 2,
            Self::Qualified => 3,
            Self::TourScheduled => 4,
            Self::Toured => 5,
            Self::ApplicationSubmitted => 6,
            Self::Leased => 7,
        }
    }

    /// Whether a lead with this status has reached `stage`
    pub fn reached(&self, stage: LeadStatus) -> bool {
        self.rank() >= stage.rank() && *self != LeadStatus::Lost
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A prospective resident
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub status: LeadStatus,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub property_id: Option<String>,
    #[serde(default)]
    pub score: Option<u32>,
    #[serde(default)]
    pub move_in_date: Option<NaiveDate>,
    #[serde(default)]
    pub budget_min: Option<f64>,
    #[serde(default)]
    pub budget_max: Option<f64>,
    #[serde(default)]
    pub bedrooms: Option<u32>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
            phone: None,
            status: LeadStatus::New,
            source: None,
            campaign_id: None,
            property_id: None,
            score: None,
            move_in_date: None,
            budget_min: None,
            budget_max: None,
            bedrooms: None,
            notes: String::new(),
            assigned_to: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Timeline entry attached to a lead
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadActivity {
    pub lead_id: String,
    pub activity_type: String,
    pub description: String,
    #[serde(default)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl LeadActivity {
    pub fn new(
        lead_id: impl Into<String>,
        activity_type: impl Into<String>,
        description: impl Into<String>,
        metadata: Value,
    ) -> Self {
        Self {
            lead_id: lead_id.into(),
            activity_type: activity_type.into(),
            description: description.into(),
            metadata,
            created_at: Utc::now(),
        }
    }
}

/// Mutation applied to a lead under the store's write lock
pub type LeadUpdate = Box<dyn FnOnce(&mut Lead) + Send>;

/// Storage for leads and their activity timeline
#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn get(&self, lead_id: &str) -> Result<Option<Lead>>;

    async fn list(&self) -> Result<Vec<Lead>>;

    /// Apply `update` atomically. Returns the updated lead, or `None` if unknown.
    async fn update(&self, lead_id: &str, update: LeadUpdate) -> Result<Option<Lead>>;

    async fn record_activity(&self, activity: LeadActivity) -> Result<()>;

    async fn activities(&self, lead_id: &str) -> Result<Vec<LeadActivity>>;
}

/// Lead store kept in process memory
#[derive(Default)]
pub struct InMemoryLeadStore {
    leads: RwLock<HashMap<String, Lead>>,
    activities: RwLock<Vec<LeadActivity>>,
}

impl InMemoryLeadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_leads(leads: Vec<Lead>) -> Self {
        let leads = leads.into_iter().map(|l| (l.id.clone(), l)).collect();
        Self {
            leads: RwLock::new(leads),
            activities: RwLock::new(Vec::new()),
        }
    }

    pub async fn insert(&self, lead: Lead) {
        self.leads.write().await.insert(lead.id.clone(), lead);
    }
}

#[async_trait]
impl LeadStore for InMemoryLeadStore {
    async fn get(&self, lead_id: &str) -> Result<Option<Lead>> {
        Ok(self.leads.read().await.get(lead_id).cloned())
    }

    async fn list(&self) -> Result<Vec<Lead>> {
        let mut leads: Vec<Lead> = self.leads.read().await.values().cloned().collect();
        leads.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(leads)
    }

    async fn update(&self, lead_id: &str, update: LeadUpdate) -> Result<Option<Lead>> {
        let mut leads = self.leads.write().await;
        let Some(lead) = leads.get_mut(lead_id) else {
            return Ok(None);
        };
        update(lead);
        lead.updated_at = Utc::now();
        debug!("Updated lead {}", lead_id);
        Ok(Some(lead.clone()))
    }

    async fn record_activity(&self, activity: LeadActivity) -> Result<()> {
        debug!(
            "Lead activity {} for {}: {}",
            activity.activity_type, activity.lead_id, activity.description
        );
        self.activities.write().await.push(activity);
        Ok(())
    }

    async fn activities(&self, lead_id: &str) -> Result<Vec<LeadActivity>> {
        Ok(self
            .activities
            .read()
            .await
            .iter()
            .filter(|a| a.lead_id == lead_id)
            .cloned()
            .collect())
    }
}
