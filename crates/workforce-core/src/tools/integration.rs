//! Ad platform and property management system tools

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde_json::{Map, Value, json};

use super::{
    ParamKind, ToolBackends, ToolHandler, ToolRegistry, ToolSchema, opt_f64, opt_str, opt_u64,
    str_arg,
};
use crate::stores::ads::generate_ad_copy;
use crate::stores::{
    AdCopyRequest, AdPlatform, CampaignInsights, CampaignStatus, CampaignUpdate, LeadActivity,
    LeadStore, PropertySystem,
};

pub fn register(registry: &mut ToolRegistry, backends: &ToolBackends) {
    registry.register(Arc::new(UpdateAdCampaignTool {
        ads: backends.ads.clone(),
    }));
    registry.register(Arc::new(AdCampaignInsightsTool {
        ads: backends.ads.clone(),
    }));
    registry.register(Arc::new(TrackAdConversionTool {
        ads: backends.ads.clone(),
        leads: backends.leads.clone(),
    }));
    registry.register(Arc::new(GenerateAdCopyTool));
    registry.register(Arc::new(SyncPropertySystemTool {
        property_system: backends.property_system.clone(),
    }));
}

pub struct UpdateAdCampaignTool {
    ads: Arc<dyn AdPlatform>,
}

#[async_trait]
impl ToolHandler for UpdateAdCampaignTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "update_ad_campaign",
            "Pause, resume or re-budget an advertising campaign. Provide at least one change.",
        )
        .required("campaign_id", ParamKind::String, "ID of the campaign")
        .optional("status", ParamKind::String, "New campaign status")
        .one_of(&["active", "paused", "archived"])
        .optional("daily_budget", ParamKind::Number, "New daily budget in dollars")
        .optional("name", ParamKind::String, "New campaign name")
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
        let campaign_id = str_arg(&args, "campaign_id")?;
        let update = CampaignUpdate {
            status: opt_str(&args, "status").and_then(CampaignStatus::from_string),
            daily_budget: opt_f64(&args, "daily_budget"),
            name: opt_str(&args, "name").map(str::to_string),
        };
        let applied = serde_json::to_value(&update).context("Failed to serialize update")?;

        let campaign = self.ads.update_campaign(campaign_id, update).await?;
        Ok(json!({
            "campaign_id": campaign.id,
            "updated": applied,
            "status": campaign.status,
            "daily_budget": campaign.daily_budget,
        }))
    }
}

pub struct AdCampaignInsightsTool {
    ads: Arc<dyn AdPlatform>,
}

#[async_trait]
impl ToolHandler for AdCampaignInsightsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "get_ad_campaign_insights",
            "Impressions, reach, clicks, spend, CTR, CPC and CPM for a campaign.",
        )
        .required("campaign_id", ParamKind::String, "ID of the campaign")
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
        let campaign_id = str_arg(&args, "campaign_id")?;
        let campaign = self
            .ads
            .campaign(campaign_id)
            .await?
            .ok_or_else(|| anyhow!("Campaign not found: {}", campaign_id))?;
        serde_json::to_value(CampaignInsights::from_campaign(&campaign))
            .context("Failed to serialize insights")
    }
}

pub struct TrackAdConversionTool {
    ads: Arc<dyn AdPlatform>,
    leads: Arc<dyn LeadStore>,
}

#[async_trait]
impl ToolHandler for TrackAdConversionTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "track_ad_conversion",
            "Report a lead conversion (tour, application, lease) back to the ad network.",
        )
        .required("lead_id", ParamKind::String, "ID of the converting lead")
        .required("conversion_type", ParamKind::String, "Kind of conversion")
        .one_of(&["lead", "tour_scheduled", "application", "lease_signed"])
        .optional("value", ParamKind::Number, "Conversion value in dollars")
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
        let lead_id = str_arg(&args, "lead_id")?;
        let conversion_type = str_arg(&args, "conversion_type")?;
        if self.leads.get(lead_id).await?.is_none() {
            return Err(anyhow!("Lead {} not found", lead_id));
        }

        let conversion = self
            .ads
            .track_conversion(lead_id, conversion_type, opt_f64(&args, "value"))
            .await?;
        self.leads
            .record_activity(LeadActivity::new(
                lead_id,
                "conversion_tracked",
                format!("{} conversion reported", conversion_type),
                json!({"conversion_id": conversion.id}),
            ))
            .await?;

        serde_json::to_value(conversion).context("Failed to serialize conversion")
    }
}

pub struct GenerateAdCopyTool;

#[async_trait]
impl ToolHandler for GenerateAdCopyTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "generate_ad_copy",
            "Draft ad copy variations for a property, sized to the target platform's limits.",
        )
        .required("property_name", ParamKind::String, "Name of the property")
        .optional("platform", ParamKind::String, "Target platform (default facebook)")
        .one_of(&["facebook", "instagram", "google", "linkedin", "tiktok"])
        .optional("objective", ParamKind::String, "Campaign objective (default lead_generation)")
        .one_of(&["lead_generation", "traffic", "awareness"])
        .optional("special_offer", ParamKind::String, "Current promotion to feature")
        .optional("highlights", ParamKind::Array, "Amenities or selling points")
        .optional("num_variations", ParamKind::Integer, "How many variations (1-10, default 3)")
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
        let request = AdCopyRequest {
            property_name: str_arg(&args, "property_name")?.to_string(),
            platform: opt_str(&args, "platform").unwrap_or("facebook").to_string(),
            objective: opt_str(&args, "objective")
                .unwrap_or("lead_generation")
                .to_string(),
            special_offer: opt_str(&args, "special_offer").map(str::to_string),
            highlights: args
                .get("highlights")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            variations: opt_u64(&args, "num_variations").unwrap_or(3) as usize,
        };

        let variations = generate_ad_copy(&request);
        Ok(json!({
            "property_name": request.property_name,
            "platform": request.platform,
            "variations": variations,
        }))
    }
}

pub struct SyncPropertySystemTool {
    property_system: Arc<dyn PropertySystem>,
}

#[async_trait]
impl ToolHandler for SyncPropertySystemTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "sync_property_management_system",
            "Pull the latest unit, resident and lease records for a property from the property management system.",
        )
        .required("property_id", ParamKind::String, "ID of the property")
        .optional("sync_type", ParamKind::String, "What to sync (default full)")
        .one_of(&["full", "units", "residents", "leases"])
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
        let property_id = str_arg(&args, "property_id")?;
        let sync_type = opt_str(&args, "sync_type").unwrap_or("full");
        let report = self.property_system.sync(property_id, sync_type).await?;
        serde_json::to_value(report).context("Failed to serialize sync report")
    }
}
