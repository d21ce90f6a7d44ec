//! Funnel and campaign analytics computed over the lead store and ad platform

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ads::{AdPlatform, Campaign};
use super::leads::{Lead, LeadStatus, LeadStore};

/// Revenue attributed to one signed lease when estimating ROI
pub const DEFAULT_AVERAGE_MONTHLY_RENT: f64 = 1800.0;

/// Reporting window ending now
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Period {
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
    #[serde(rename = "1y")]
    Year,
}

impl Period {
    pub const NAMES: [&'static str; 4] = ["7d", "30d", "90d", "1y"];

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "7d" => Some(Self::Week),
            "30d" => Some(Self::Month),
            "90d" => Some(Self::Quarter),
            "1y" => Some(Self::Year),
            _ => None,
        }
    }

    pub fn days(&self) -> i64 {
        match self {
            Self::Week => 7,
            Self::Month => 30,
            Self::Quarter => 90,
            Self::Year => 365,
        }
    }

    fn contains(&self, lead: &Lead) -> bool {
        lead.created_at >= Utc::now() - Duration::days(self.days())
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Week => write!(f, "7d"),
            Self::Month => write!(f, "30d"),
            Self::Quarter => write!(f, "90d"),
            Self::Year => write!(f, "1y"),
        }
    }
}

/// Funnel transition measured by `conversion_rate`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FunnelStage {
    LeadToTour,
    TourToApp,
    AppToLease,
}

impl FunnelStage {
    pub const NAMES: [&'static str; 3] = ["lead_to_tour", "tour_to_app", "app_to_lease"];

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "lead_to_tour" => Some(Self::LeadToTour),
            "tour_to_app" => Some(Self::TourToApp),
            "app_to_lease" => Some(Self::AppToLease),
            _ => None,
        }
    }

    /// Whether a lead counts toward the denominator of this transition
    fn entered(&self, status: LeadStatus) -> bool {
        match self {
            Self::LeadToTour => true,
            Self::TourToApp => status.reached(LeadStatus::TourScheduled),
            Self::AppToLease => status.reached(LeadStatus::ApplicationSubmitted),
        }
    }

    fn converted(&self, status: LeadStatus) -> bool {
        match self {
            Self::LeadToTour => status.reached(LeadStatus::TourScheduled),
            Self::TourToApp => status.reached(LeadStatus::ApplicationSubmitted),
            Self::AppToLease => status.reached(LeadStatus::Leased),
        }
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadMetrics {
    pub period: Period,
    pub property_id: Option<String>,
    pub total_leads: usize,
    pub by_status: BTreeMap<String, usize>,
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRate {
    pub stage: FunnelStage,
    pub period: Period,
    pub converted: usize,
    pub total: usize,
    pub rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignPerformance {
    pub campaign_id: String,
    pub name: String,
    pub platform: String,
    pub spend: f64,
    pub impressions: u64,
    pub clicks: u64,
    pub ctr: f64,
    pub leads: usize,
    pub leased: usize,
    pub cost_per_lead: Option<f64>,
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyStats {
    pub property_id: String,
    pub period: Period,
    pub total_leads: usize,
    pub tours: usize,
    pub applications: usize,
    pub leased: usize,
    pub conversion_rate: f64,
    pub average_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceStats {
    pub source: String,
    pub leads: usize,
    pub leased: usize,
    pub share: f64,
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoiReport {
    pub campaign_id: String,
    pub spend: f64,
    pub leases: usize,
    pub average_monthly_rent: f64,
    pub estimated_revenue: f64,
    /// `None` when nothing was spent
    pub roi_percent: Option<f64>,
    pub cost_per_lease: Option<f64>,
}

/// Reporting queries used by the marketing tools
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    async fn lead_metrics(&self, period: Period, property_id: Option<&str>) -> Result<LeadMetrics>;

    async fn conversion_rate(
        &self,
        stage: FunnelStage,
        period: Period,
        property_id: Option<&str>,
    ) -> Result<ConversionRate>;

    async fn campaign_performance(&self, campaign_id: Option<&str>) -> Result<Vec<CampaignPerformance>>;

    async fn property_stats(&self, property_id: &str, period: Period) -> Result<PropertyStats>;

    async fn source_breakdown(&self, period: Period) -> Result<Vec<SourceStats>>;

    async fn roi(&self, campaign_id: &str) -> Result<RoiReport>;
}

/// Analytics derived on demand from the live collaborators
pub struct StoreAnalytics {
    leads: Arc<dyn LeadStore>,
    ads: Arc<dyn AdPlatform>,
    average_monthly_rent: f64,
}

impl StoreAnalytics {
    pub fn new(leads: Arc<dyn LeadStore>, ads: Arc<dyn AdPlatform>) -> Self {
        Self {
            leads,
            ads,
            average_monthly_rent: DEFAULT_AVERAGE_MONTHLY_RENT,
        }
    }

    pub fn with_average_monthly_rent(mut self, rent: f64) -> Self {
        self.average_monthly_rent = rent;
        self
    }

    async fn leads_in(&self, period: Period, property_id: Option<&str>) -> Result<Vec<Lead>> {
        Ok(self
            .leads
            .list()
            .await?
            .into_iter()
            .filter(|l| period.contains(l))
            .filter(|l| property_id.is_none_or(|p| l.property_id.as_deref() == Some(p)))
            .collect())
    }

    fn performance(campaign: &Campaign, leads: &[Lead]) -> CampaignPerformance {
        let attributed: Vec<&Lead> = leads
            .iter()
            .filter(|l| l.campaign_id.as_deref() == Some(campaign.id.as_str()))
            .collect();
        let leased = attributed
            .iter()
            .filter(|l| l.status == LeadStatus::Leased)
            .count();
        CampaignPerformance {
            campaign_id: campaign.id.clone(),
            name: campaign.name.clone(),
            platform: campaign.platform.clone(),
            spend: campaign.spend,
            impressions: campaign.impressions,
            clicks: campaign.clicks,
            ctr: round2(percent(campaign.clicks as usize, campaign.impressions as usize)),
            leads: attributed.len(),
            leased,
            cost_per_lead: (!attributed.is_empty())
                .then(|| round2(campaign.spend / attributed.len() as f64)),
            conversion_rate: round2(percent(leased, attributed.len())),
        }
    }
}

#[async_trait]
impl AnalyticsStore for StoreAnalytics {
    async fn lead_metrics(&self, period: Period, property_id: Option<&str>) -> Result<LeadMetrics> {
        let leads = self.leads_in(period, property_id).await?;
        let mut by_status: BTreeMap<String, usize> = LeadStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        for lead in &leads {
            *by_status.entry(lead.status.as_str().to_string()).or_default() += 1;
        }
        let leased = by_status.get(LeadStatus::Leased.as_str()).copied().unwrap_or(0);
        debug!("Lead metrics over {}: {} leads", period, leads.len());

        Ok(LeadMetrics {
            period,
            property_id: property_id.map(str::to_string),
            total_leads: leads.len(),
            by_status,
            conversion_rate: round2(percent(leased, leads.len())),
        })
    }

    async fn conversion_rate(
        &self,
        stage: FunnelStage,
        period: Period,
        property_id: Option<&str>,
    ) -> Result<ConversionRate> {
        let leads = self.leads_in(period, property_id).await?;
        let total = leads.iter().filter(|l| stage.entered(l.status)).count();
        let converted = leads.iter().filter(|l| stage.converted(l.status)).count();
        Ok(ConversionRate {
            stage,
            period,
            converted,
            total,
            rate: round2(percent(converted, total)),
        })
    }

    async fn campaign_performance(&self, campaign_id: Option<&str>) -> Result<Vec<CampaignPerformance>> {
        let campaigns: Vec<Campaign> = match campaign_id {
            Some(id) => match self.ads.campaign(id).await? {
                Some(c) => vec![c],
                None => bail!("Campaign not found: {}", id),
            },
            None => self.ads.campaigns().await?,
        };
        let leads = self.leads.list().await?;
        Ok(campaigns
            .iter()
            .map(|c| Self::performance(c, &leads))
            .collect())
    }

    async fn property_stats(&self, property_id: &str, period: Period) -> Result<PropertyStats> {
        let leads = self.leads_in(period, Some(property_id)).await?;
        let count = |stage: LeadStatus| leads.iter().filter(|l| l.status.reached(stage)).count();
        let leased = count(LeadStatus::Leased);
        let scores: Vec<u32> = leads.iter().filter_map(|l| l.score).collect();
        let average_score = (!scores.is_empty())
            .then(|| round2(scores.iter().sum::<u32>() as f64 / scores.len() as f64));

        Ok(PropertyStats {
            property_id: property_id.to_string(),
            period,
            total_leads: leads.len(),
            tours: count(LeadStatus::TourScheduled),
            applications: count(LeadStatus::ApplicationSubmitted),
            leased,
            conversion_rate: round2(percent(leased, leads.len())),
            average_score,
        })
    }

    async fn source_breakdown(&self, period: Period) -> Result<Vec<SourceStats>> {
        let leads = self.leads_in(period, None).await?;
        let mut grouped: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        for lead in &leads {
            let source = lead.source.clone().unwrap_or_else(|| "unknown".to_string());
            let entry = grouped.entry(source).or_default();
            entry.0 += 1;
            if lead.status == LeadStatus::Leased {
                entry.1 += 1;
            }
        }

        let mut stats: Vec<SourceStats> = grouped
            .into_iter()
            .map(|(source, (count, leased))| SourceStats {
                source,
                leads: count,
                leased,
                share: round2(percent(count, leads.len())),
                conversion_rate: round2(percent(leased, count)),
            })
            .collect();
        stats.sort_by(|a, b| b.leads.cmp(&a.leads).then(a.source.cmp(&b.source)));
        Ok(stats)
    }

    async fn roi(&self, campaign_id: &str) -> Result<RoiReport> {
        let Some(campaign) = self.ads.campaign(campaign_id).await? else {
            bail!("Campaign not found: {}", campaign_id);
        };
        let leases = self
            .leads
            .list()
            .await?
            .iter()
            .filter(|l| l.campaign_id.as_deref() == Some(campaign_id))
            .filter(|l| l.status == LeadStatus::Leased)
            .count();
        let revenue = leases as f64 * self.average_monthly_rent;
        let spend = campaign.spend;

        Ok(RoiReport {
            campaign_id: campaign_id.to_string(),
            spend,
            leases,
            average_monthly_rent: self.average_monthly_rent,
            estimated_revenue: round2(revenue),
            roi_percent: (spend > 0.0).then(|| round2((revenue - spend) / spend * 100.0)),
            cost_per_lease: (leases > 0).then(|| round2(spend / leases as f64)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::ads::{CampaignStatus, InMemoryAdPlatform};
    use crate::stores::leads::InMemoryLeadStore;

    fn lead(id: &str, status: LeadStatus, source: &str, campaign: Option<&str>) -> Lead {
        let mut lead = Lead::new(id, id);
        lead.status = status;
        lead.source = Some(source.to_string());
        lead.campaign_id = campaign.map(String::from);
        lead.property_id = Some("p1".to_string());
        lead
    }

    fn analytics() -> StoreAnalytics {
        let mut old = lead("old", LeadStatus::Leased, "facebook", Some("c1"));
        old.created_at = Utc::now() - Duration::days(40);

        let leads = InMemoryLeadStore::with_leads(vec![
            lead("a", LeadStatus::New, "facebook", Some("c1")),
            lead("b", LeadStatus::TourScheduled, "facebook", Some("c1")),
            lead("c", LeadStatus::ApplicationSubmitted, "google", None),
            lead("d", LeadStatus::Leased, "google", None),
            lead("e", LeadStatus::Lost, "website", None),
            old,
        ]);
        let ads = InMemoryAdPlatform::new(vec![Campaign {
            id: "c1".into(),
            name: "Spring".into(),
            platform: "facebook".into(),
            source: Some("facebook".into()),
            property_id: Some("p1".into()),
            status: CampaignStatus::Active,
            daily_budget: 20.0,
            spend: 900.0,
            impressions: 4000,
            clicks: 100,
            reach: 3000,
        }]);
        StoreAnalytics::new(Arc::new(leads), Arc::new(ads))
    }

    #[test]
    fn test_period_parsing() {
        for name in Period::NAMES {
            assert_eq!(Period::from_string(name).unwrap().to_string(), name);
        }
        assert!(Period::from_string("2w").is_none());
    }

    #[tokio::test]
    async fn test_lead_metrics_respects_period() {
        let analytics = analytics();
        let week = analytics.lead_metrics(Period::Week, None).await.unwrap();
        assert_eq!(week.total_leads, 5);
        assert_eq!(week.by_status["leased"], 1);
        assert_eq!(week.by_status["toured"], 0);
        assert_eq!(week.conversion_rate, 20.0);

        let quarter = analytics.lead_metrics(Period::Quarter, Some("p1")).await.unwrap();
        assert_eq!(quarter.total_leads, 6);

        let other = analytics.lead_metrics(Period::Year, Some("p9")).await.unwrap();
        assert_eq!(other.total_leads, 0);
        assert_eq!(other.conversion_rate, 0.0);
    }

    #[tokio::test]
    async fn test_conversion_rates_by_stage() {
        let analytics = analytics();
        let tour = analytics
            .conversion_rate(FunnelStage::LeadToTour, Period::Week, None)
            .await
            .unwrap();
        // b, c, d reached a tour out of all five (lost included)
        assert_eq!((tour.converted, tour.total), (3, 5));
        assert_eq!(tour.rate, 60.0);

        let lease = analytics
            .conversion_rate(FunnelStage::AppToLease, Period::Week, None)
            .await
            .unwrap();
        assert_eq!((lease.converted, lease.total), (1, 2));
    }

    #[tokio::test]
    async fn test_campaign_performance_and_roi() {
        let analytics = analytics();
        let perf = analytics.campaign_performance(Some("c1")).await.unwrap();
        assert_eq!(perf.len(), 1);
        assert_eq!(perf[0].leads, 3);
        assert_eq!(perf[0].leased, 1);
        assert_eq!(perf[0].cost_per_lead, Some(300.0));
        assert_eq!(perf[0].ctr, 2.5);

        let roi = analytics.roi("c1").await.unwrap();
        assert_eq!(roi.leases, 1);
        assert_eq!(roi.estimated_revenue, 1800.0);
        assert_eq!(roi.roi_percent, Some(100.0));
        assert_eq!(roi.cost_per_lease, Some(900.0));

        assert!(analytics.roi("c9").await.is_err());
        assert!(analytics.campaign_performance(Some("c9")).await.is_err());
    }

    #[tokio::test]
    async fn test_source_breakdown_sorted_by_volume() {
        let stats = analytics().source_breakdown(Period::Week).await.unwrap();
        let sources: Vec<&str> = stats.iter().map(|s| s.source.as_str()).collect();
        assert_eq!(sources, vec!["facebook", "google", "website"]);
        assert_eq!(stats[0].share, 40.0);
        assert_eq!(stats[1].conversion_rate, 50.0);
    }

    #[tokio::test]
    async fn test_property_stats() {
        let stats = analytics().property_stats("p1", Period::Week).await.unwrap();
        assert_eq!(stats.total_leads, 5);
        assert_eq!(stats.tours, 3);
        assert_eq!(stats.applications, 2);
        assert_eq!(stats.leased, 1);
        assert!(stats.average_score.is_none());
    }
}
