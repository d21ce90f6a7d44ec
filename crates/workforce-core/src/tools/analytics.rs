//! Marketing analytics tools

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value, json};

use super::{ParamKind, ToolBackends, ToolHandler, ToolRegistry, ToolSchema, opt_str, str_arg};
use crate::stores::{AnalyticsStore, FunnelStage, Period};

pub fn register(registry: &mut ToolRegistry, backends: &ToolBackends) {
    for query in [
        AnalyticsQuery::LeadMetrics,
        AnalyticsQuery::ConversionRate,
        AnalyticsQuery::CampaignPerformance,
        AnalyticsQuery::PropertyStats,
        AnalyticsQuery::SourceBreakdown,
        AnalyticsQuery::Roi,
    ] {
        registry.register(Arc::new(AnalyticsTool {
            query,
            analytics: backends.analytics.clone(),
        }));
    }
}

/// The reporting query an `AnalyticsTool` answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyticsQuery {
    LeadMetrics,
    ConversionRate,
    CampaignPerformance,
    PropertyStats,
    SourceBreakdown,
    Roi,
}

fn period(args: &Map<String, Value>) -> Result<Period> {
    let raw = opt_str(args, "period").unwrap_or("30d");
    Period::from_string(raw).ok_or_else(|| anyhow!("Unknown period: {}", raw))
}

fn to_json<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value).context("Failed to serialize analytics result")
}

/// One analytics query exposed as a tool
pub struct AnalyticsTool {
    query: AnalyticsQuery,
    analytics: Arc<dyn AnalyticsStore>,
}

impl AnalyticsTool {
    pub fn new(query: AnalyticsQuery, analytics: Arc<dyn AnalyticsStore>) -> Self {
        Self { query, analytics }
    }
}

#[async_trait]
impl ToolHandler for AnalyticsTool {
    fn schema(&self) -> ToolSchema {
        let with_period = |schema: ToolSchema| {
            schema
                .optional("period", ParamKind::String, "Reporting window (default 30d)")
                .one_of(&Period::NAMES)
        };

        match self.query {
            AnalyticsQuery::LeadMetrics => with_period(ToolSchema::new(
                "get_lead_metrics",
                "Lead counts by funnel status and overall lead-to-lease conversion for a period.",
            ))
            .optional("property_id", ParamKind::String, "Limit to one property"),
            AnalyticsQuery::ConversionRate => with_period(
                ToolSchema::new("get_conversion_rate", "Conversion rate for one funnel transition.")
                    .required("funnel_stage", ParamKind::String, "Funnel transition")
                    .one_of(&FunnelStage::NAMES),
            )
            .optional("property_id", ParamKind::String, "Limit to one property"),
            AnalyticsQuery::CampaignPerformance => ToolSchema::new(
                "get_campaign_performance",
                "Spend, clicks, CTR, attributed leads, cost per lead and conversion for ad campaigns.",
            )
            .optional("campaign_id", ParamKind::String, "Single campaign; omit for all"),
            AnalyticsQuery::PropertyStats => with_period(
                ToolSchema::new("get_property_stats", "Funnel statistics for a single property.")
                    .required("property_id", ParamKind::String, "ID of the property"),
            ),
            AnalyticsQuery::SourceBreakdown => with_period(ToolSchema::new(
                "get_lead_source_breakdown",
                "Lead volume, share and conversion rate per lead source.",
            )),
            AnalyticsQuery::Roi => ToolSchema::new(
                "calculate_roi",
                "Estimate a campaign's return on ad spend from signed leases and average rent.",
            )
            .required("campaign_id", ParamKind::String, "ID of the campaign"),
        }
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
        let property_id = opt_str(&args, "property_id");
        match self.query {
            AnalyticsQuery::LeadMetrics => {
                to_json(self.analytics.lead_metrics(period(&args)?, property_id).await?)
            }
            AnalyticsQuery::ConversionRate => {
                let raw = str_arg(&args, "funnel_stage")?;
                let stage = FunnelStage::from_string(raw)
                    .ok_or_else(|| anyhow!("Unknown funnel stage: {}", raw))?;
                to_json(
                    self.analytics
                        .conversion_rate(stage, period(&args)?, property_id)
                        .await?,
                )
            }
            AnalyticsQuery::CampaignPerformance => {
                let campaigns = self
                    .analytics
                    .campaign_performance(opt_str(&args, "campaign_id"))
                    .await?;
                Ok(json!({"count": campaigns.len(), "campaigns": to_json(campaigns)?}))
            }
            AnalyticsQuery::PropertyStats => {
                let property_id = str_arg(&args, "property_id")?;
                to_json(self.analytics.property_stats(property_id, period(&args)?).await?)
            }
            AnalyticsQuery::SourceBreakdown => {
                let period = period(&args)?;
                let sources = self.analytics.source_breakdown(period).await?;
                Ok(json!({"period": period, "sources": to_json(sources)?}))
            }
            AnalyticsQuery::Roi => {
                to_json(self.analytics.roi(str_arg(&args, "campaign_id")?).await?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::{InMemoryAdPlatform, InMemoryLeadStore, Lead, LeadStatus, StoreAnalytics};

    fn tool(query: AnalyticsQuery) -> AnalyticsTool {
        let mut leased = Lead::new("l1", "Dana");
        leased.status = LeadStatus::Leased;
        leased.source = Some("zillow".into());
        let leads = InMemoryLeadStore::with_leads(vec![leased, Lead::new("l2", "Sam")]);
        let analytics = StoreAnalytics::new(Arc::new(leads), Arc::new(InMemoryAdPlatform::default()));
        AnalyticsTool::new(query, Arc::new(analytics))
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_schema_names_are_distinct() {
        let names: std::collections::HashSet<String> = [
            AnalyticsQuery::LeadMetrics,
            AnalyticsQuery::ConversionRate,
            AnalyticsQuery::CampaignPerformance,
            AnalyticsQuery::PropertyStats,
            AnalyticsQuery::SourceBreakdown,
            AnalyticsQuery::Roi,
        ]
        .into_iter()
        .map(|q| tool(q).schema().name)
        .collect();
        assert_eq!(names.len(), 6);
    }

    #[test]
    fn test_period_enum_in_schema() {
        let schema = tool(AnalyticsQuery::LeadMetrics).schema();
        assert!(schema.validate(&args(json!({"period": "1y"}))).is_ok());
        assert!(schema.validate(&args(json!({"period": "2w"}))).is_err());
    }

    #[tokio::test]
    async fn test_lead_metrics_defaults_to_30_days() {
        let out = tool(AnalyticsQuery::LeadMetrics)
            .execute(Map::new())
            .await
            .unwrap();
        assert_eq!(out["period"], "30d");
        assert_eq!(out["total_leads"], 2);
        assert_eq!(out["conversion_rate"], 50.0);
    }

    #[tokio::test]
    async fn test_source_breakdown() {
        let out = tool(AnalyticsQuery::SourceBreakdown)
            .execute(args(json!({"period": "7d"})))
            .await
            .unwrap();
        assert_eq!(out["sources"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_roi_unknown_campaign_fails() {
        let result = tool(AnalyticsQuery::Roi)
            .execute(args(json!({"campaign_id": "nope"})))
            .await;
        assert!(result.is_err());
    }
}
