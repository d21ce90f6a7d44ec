//! Advertising and property-management-system collaborators

use std::collections::HashMap;

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    #[default]
    Active,
    Paused,
    Archived,
}

impl CampaignStatus {
    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

/// A paid advertising campaign
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    /// Ad network, e.g. `facebook` or `google`
    pub platform: String,
    /// Lead source label attributed to this campaign's leads
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub property_id: Option<String>,
    #[serde(default)]
    pub status: CampaignStatus,
    #[serde(default)]
    pub daily_budget: f64,
    #[serde(default)]
    pub spend: f64,
    #[serde(default)]
    pub impressions: u64,
    #[serde(default)]
    pub clicks: u64,
    #[serde(default)]
    pub reach: u64,
}

/// Requested campaign changes; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignUpdate {
    pub status: Option<CampaignStatus>,
    pub daily_budget: Option<f64>,
    pub name: Option<String>,
}

impl CampaignUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.daily_budget.is_none() && self.name.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignInsights {
    pub campaign_id: String,
    pub impressions: u64,
    pub clicks: u64,
    pub reach: u64,
    pub spend: f64,
    pub ctr: f64,
    pub cpc: f64,
    pub cpm: f64,
}

impl CampaignInsights {
    pub fn from_campaign(campaign: &Campaign) -> Self {
        let ratio = |num: f64, den: f64| if den > 0.0 { num / den } else { 0.0 };
        Self {
            campaign_id: campaign.id.clone(),
            impressions: campaign.impressions,
            clicks: campaign.clicks,
            reach: campaign.reach,
            spend: campaign.spend,
            ctr: ratio(campaign.clicks as f64, campaign.impressions as f64) * 100.0,
            cpc: ratio(campaign.spend, campaign.clicks as f64),
            cpm: ratio(campaign.spend, campaign.impressions as f64) * 1000.0,
        }
    }
}

/// A conversion reported back to an ad network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversion {
    pub id: String,
    pub lead_id: String,
    pub conversion_type: String,
    pub value: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

/// Ad network boundary
#[async_trait]
pub trait AdPlatform: Send + Sync {
    async fn campaigns(&self) -> Result<Vec<Campaign>>;

    async fn campaign(&self, campaign_id: &str) -> Result<Option<Campaign>>;

    async fn update_campaign(&self, campaign_id: &str, update: CampaignUpdate) -> Result<Campaign>;

    async fn track_conversion(
        &self,
        lead_id: &str,
        conversion_type: &str,
        value: Option<f64>,
    ) -> Result<Conversion>;
}

/// Ad platform kept in memory, seeded from fixtures
#[derive(Default)]
pub struct InMemoryAdPlatform {
    campaigns: RwLock<HashMap<String, Campaign>>,
    conversions: RwLock<Vec<Conversion>>,
}

impl InMemoryAdPlatform {
    pub fn new(campaigns: Vec<Campaign>) -> Self {
        Self {
            campaigns: RwLock::new(campaigns.into_iter().map(|c| (c.id.clone(), c)).collect()),
            conversions: RwLock::new(Vec::new()),
        }
    }

    pub async fn conversions(&self) -> Vec<Conversion> {
        self.conversions.read().await.clone()
    }
}

#[async_trait]
impl AdPlatform for InMemoryAdPlatform {
    async fn campaigns(&self) -> Result<Vec<Campaign>> {
        let mut campaigns: Vec<Campaign> = self.campaigns.read().await.values().cloned().collect();
        campaigns.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(campaigns)
    }

    async fn campaign(&self, campaign_id: &str) -> Result<Option<Campaign>> {
        Ok(self.campaigns.read().await.get(campaign_id).cloned())
    }

    async fn update_campaign(&self, campaign_id: &str, update: CampaignUpdate) -> Result<Campaign> {
        if update.is_empty() {
            bail!("No campaign changes requested");
        }
        if let Some(budget) = update.daily_budget {
            if budget < 0.0 {
                bail!("Daily budget cannot be negative");
            }
        }

        let mut campaigns = self.campaigns.write().await;
        let Some(campaign) = campaigns.get_mut(campaign_id) else {
            bail!("Campaign not found: {}", campaign_id);
        };
        if let Some(status) = update.status {
            campaign.status = status;
        }
        if let Some(budget) = update.daily_budget {
            campaign.daily_budget = budget;
        }
        if let Some(name) = update.name {
            campaign.name = name;
        }
        info!("Updated campaign {}", campaign_id);
        Ok(campaign.clone())
    }

    async fn track_conversion(
        &self,
        lead_id: &str,
        conversion_type: &str,
        value: Option<f64>,
    ) -> Result<Conversion> {
        let conversion = Conversion {
            id: uuid::Uuid::new_v4().to_string(),
            lead_id: lead_id.to_string(),
            conversion_type: conversion_type.to_string(),
            value,
            recorded_at: Utc::now(),
        };
        debug!("Tracked {} conversion for {}", conversion_type, lead_id);
        self.conversions.write().await.push(conversion.clone());
        Ok(conversion)
    }
}

/// Inputs for ad copy generation
#[derive(Debug, Clone, Default)]
pub struct AdCopyRequest {
    pub property_name: String,
    pub platform: String,
    pub objective: String,
    pub special_offer: Option<String>,
    pub highlights: Vec<String>,
    pub variations: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdCopy {
    pub headline: String,
    pub body: String,
    pub call_to_action: String,
}

/// Character limits of a platform's headline and primary text
fn platform_limits(platform: &str) -> (usize, usize) {
    match platform {
        "facebook" => (40, 125),
        "instagram" => (40, 125),
        "google" => (30, 90),
        "linkedin" => (70, 150),
        "tiktok" => (40, 100),
        _ => (40, 125),
    }
}

fn clip(text: String, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text;
    }
    let mut clipped: String = text.chars().take(limit.saturating_sub(3)).collect();
    clipped.push_str("...");
    clipped
}

/// Template-driven ad copy respecting per-platform length limits
pub fn generate_ad_copy(request: &AdCopyRequest) -> Vec<AdCopy> {
    let (headline_limit, body_limit) = platform_limits(&request.platform);
    let name = &request.property_name;
    let highlight = if request.highlights.is_empty() {
        "modern amenities".to_string()
    } else {
        request.highlights.join(", ")
    };
    let offer = request
        .special_offer
        .as_ref()
        .map(|o| format!(" {}.", o))
        .unwrap_or_default();
    let cta = match request.objective.as_str() {
        "traffic" => "Learn More",
        "awareness" => "See Photos",
        _ => "Schedule a Tour",
    };

    let templates = [
        (
            format!("Your New Home at {}", name),
            format!("Discover {} with {}.{} Tours available this week.", name, highlight, offer),
        ),
        (
            format!("Now Leasing: {}", name),
            format!("Apartments featuring {}.{} Reserve your spot today.", highlight, offer),
        ),
        (
            format!("Live Better at {}", name),
            format!("{} offers {}.{} See why residents love it here.", name, highlight, offer),
        ),
        (
            format!("{} Is Waiting", name),
            format!("Floor plans with {}.{} Book a visit in minutes.", highlight, offer),
        ),
    ];

    templates
        .into_iter()
        .cycle()
        .take(request.variations.clamp(1, 10))
        .map(|(headline, body)| AdCopy {
            headline: clip(headline, headline_limit),
            body: clip(body, body_limit),
            call_to_action: cta.to_string(),
        })
        .collect()
}

/// Outcome of a property-management-system sync
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub property_id: String,
    pub sync_type: String,
    pub records_synced: Map<String, Value>,
    pub synced_at: DateTime<Utc>,
}

/// Property management system boundary
#[async_trait]
pub trait PropertySystem: Send + Sync {
    async fn sync(&self, property_id: &str, sync_type: &str) -> Result<SyncReport>;
}

/// Record counts a property holds in the management system
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyRecords {
    pub property_id: String,
    #[serde(default)]
    pub units: u64,
    #[serde(default)]
    pub residents: u64,
    #[serde(default)]
    pub leases: u64,
}

/// Property system backed by fixture record counts
#[derive(Default)]
pub struct InMemoryPropertySystem {
    properties: HashMap<String, PropertyRecords>,
}

impl InMemoryPropertySystem {
    pub fn new(properties: Vec<PropertyRecords>) -> Self {
        Self {
            properties: properties
                .into_iter()
                .map(|p| (p.property_id.clone(), p))
                .collect(),
        }
    }
}

#[async_trait]
impl PropertySystem for InMemoryPropertySystem {
    async fn sync(&self, property_id: &str, sync_type: &str) -> Result<SyncReport> {
        let Some(records) = self.properties.get(property_id) else {
            bail!("Property not found in management system: {}", property_id);
        };

        let mut synced = Map::new();
        let all = sync_type == "full";
        if all || sync_type == "units" {
            synced.insert("units".into(), records.units.into());
        }
        if all || sync_type == "residents" {
            synced.insert("residents".into(), records.residents.into());
        }
        if all || sync_type == "leases" {
            synced.insert("leases".into(), records.leases.into());
        }
        if synced.is_empty() {
            bail!("Unknown sync type: {}", sync_type);
        }

        info!("Synced {} records for property {}", sync_type, property_id);
        Ok(SyncReport {
            property_id: property_id.to_string(),
            sync_type: sync_type.to_string(),
            records_synced: synced,
            synced_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campaign() -> Campaign {
        Campaign {
            id: "c1".into(),
            name: "Spring Push".into(),
            platform: "facebook".into(),
            source: Some("facebook".into()),
            property_id: Some("p1".into()),
            status: CampaignStatus::Active,
            daily_budget: 50.0,
            spend: 200.0,
            impressions: 10_000,
            clicks: 250,
            reach: 8_000,
        }
    }

    #[test]
    fn test_insights_ratios() {
        let insights = CampaignInsights::from_campaign(&campaign());
        assert!((insights.ctr - 2.5).abs() < 1e-9);
        assert!((insights.cpc - 0.8).abs() < 1e-9);
        assert!((insights.cpm - 20.0).abs() < 1e-9);

        let empty = Campaign {
            impressions: 0,
            clicks: 0,
            ..campaign()
        };
        let insights = CampaignInsights::from_campaign(&empty);
        assert_eq!(insights.ctr, 0.0);
        assert_eq!(insights.cpc, 0.0);
    }

    #[tokio::test]
    async fn test_update_campaign() {
        let platform = InMemoryAdPlatform::new(vec![campaign()]);
        let updated = platform
            .update_campaign(
                "c1",
                CampaignUpdate {
                    status: Some(CampaignStatus::Paused),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, CampaignStatus::Paused);
        assert_eq!(updated.daily_budget, 50.0);

        assert!(platform.update_campaign("c1", CampaignUpdate::default()).await.is_err());
        let negative = CampaignUpdate {
            daily_budget: Some(-1.0),
            ..Default::default()
        };
        assert!(platform.update_campaign("c1", negative).await.is_err());
        let missing = CampaignUpdate {
            name: Some("x".into()),
            ..Default::default()
        };
        assert!(platform.update_campaign("c9", missing).await.is_err());
    }

    #[tokio::test]
    async fn test_track_conversion_recorded() {
        let platform = InMemoryAdPlatform::default();
        platform.track_conversion("l1", "lease_signed", Some(1800.0)).await.unwrap();
        let conversions = platform.conversions().await;
        assert_eq!(conversions.len(), 1);
        assert_eq!(conversions[0].conversion_type, "lease_signed");
    }

    #[test]
    fn test_ad_copy_respects_limits() {
        let copies = generate_ad_copy(&AdCopyRequest {
            property_name: "The Residences at Riverside Commons Grand".into(),
            platform: "google".into(),
            objective: "lead_generation".into(),
            special_offer: Some("One month free".into()),
            highlights: vec!["rooftop pool".into()],
            variations: 5,
        });
        assert_eq!(copies.len(), 5);
        for copy in &copies {
            assert!(copy.headline.chars().count() <= 30);
            assert!(copy.body.chars().count() <= 90);
            assert_eq!(copy.call_to_action, "Schedule a Tour");
        }
    }

    #[tokio::test]
    async fn test_property_sync() {
        let pms = InMemoryPropertySystem::new(vec![PropertyRecords {
            property_id: "p1".into(),
            units: 150,
            residents: 120,
            leases: 115,
        }]);

        let full = pms.sync("p1", "full").await.unwrap();
        assert_eq!(full.records_synced.len(), 3);
        let units = pms.sync("p1", "units").await.unwrap();
        assert_eq!(units.records_synced["units"], 150);
        assert!(pms.sync("p1", "payments").await.is_err());
        assert!(pms.sync("p2", "full").await.is_err());
    }
}
