//! Marketing specialist: campaign, source and funnel analysis

use std::sync::Arc;

use crate::runtime::{AgentResponse, AgentRuntime};
use crate::types::AgentRequest;

#[derive(Clone)]
pub struct MarketingAgent {
    runtime: Arc<AgentRuntime>,
}

fn scope(property_id: Option<&str>) -> String {
    match property_id {
        Some(id) => format!("Property ID: {id}"),
        None => "All properties".to_string(),
    }
}

fn with_property(request: AgentRequest, property_id: Option<&str>) -> AgentRequest {
    match property_id {
        Some(id) => request.with_context("property_id", id),
        None => request,
    }
}

impl MarketingAgent {
    pub fn new(runtime: Arc<AgentRuntime>) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &AgentRuntime {
        &self.runtime
    }

    pub async fn execute(&self, request: &AgentRequest) -> AgentResponse {
        self.runtime.execute(request).await
    }

    pub async fn analyze_campaign_performance(
        &self,
        campaign_id: Option<&str>,
        period: &str,
    ) -> AgentResponse {
        let target = match campaign_id {
            Some(id) => format!("Campaign ID: {id}"),
            None => "All campaigns".to_string(),
        };
        let task = format!(
            "Analyze marketing campaign performance for the last {period}.\n\n\
             {target}\n\n\
             Steps:\n\
             1. Get campaign performance metrics\n\
             2. Calculate conversion rates at each funnel stage\n\
             3. Analyze ROI and cost efficiency\n\
             4. Identify top performing and underperforming campaigns\n\
             5. Recommend specific optimizations\n\n\
             Provide an analysis with actionable insights."
        );
        let mut request = AgentRequest::system(task).with_context("period", period);
        if let Some(id) = campaign_id {
            request = request.with_context("campaign_id", id);
        }
        self.runtime
            .execute_as("analyze_campaign_performance", &request)
            .await
    }

    pub async fn optimize_lead_sources(
        &self,
        property_id: Option<&str>,
        period: &str,
    ) -> AgentResponse {
        let task = format!(
            "Analyze lead sources and recommend optimizations.\n\n\
             {}\nPeriod: {period}\n\n\
             Steps:\n\
             1. Get the lead source breakdown\n\
             2. Compare volume and conversion rate by source\n\
             3. Identify the best and worst performing sources\n\
             4. Recommend budget reallocation and fixes for weak sources\n\n\
             Provide data-driven recommendations for the lead source strategy.",
            scope(property_id)
        );
        let request = with_property(
            AgentRequest::system(task).with_context("period", period),
            property_id,
        );
        self.runtime.execute_as("optimize_lead_sources", &request).await
    }

    pub async fn recommend_budget_allocation(
        &self,
        total_budget: f64,
        property_id: Option<&str>,
    ) -> AgentResponse {
        let task = format!(
            "Recommend how to allocate a ${total_budget:.2} marketing budget.\n\n\
             {}\n\n\
             Steps:\n\
             1. Get historical performance by channel\n\
             2. Calculate ROI and cost per lease for each channel\n\
             3. Recommend a percentage allocation by channel with rationale\n\
             4. Estimate the expected results\n\n\
             Provide a budget allocation plan.",
            scope(property_id)
        );
        let request = with_property(
            AgentRequest::system(task).with_context("total_budget", total_budget),
            property_id,
        );
        self.runtime
            .execute_as("recommend_budget_allocation", &request)
            .await
    }

    pub async fn analyze_conversion_funnel(
        &self,
        property_id: Option<&str>,
        period: &str,
    ) -> AgentResponse {
        let task = format!(
            "Analyze the lead conversion funnel for the last {period}.\n\n\
             {}\n\n\
             Steps:\n\
             1. Get conversion rates for lead to tour, tour to application and application to lease\n\
             2. Identify the biggest drop-off points\n\
             3. Recommend improvements for low-converting stages\n\n\
             Provide a funnel analysis with specific recommendations.",
            scope(property_id)
        );
        let request = with_property(
            AgentRequest::system(task).with_context("period", period),
            property_id,
        );
        self.runtime
            .execute_as("analyze_conversion_funnel", &request)
            .await
    }

    pub async fn generate_marketing_report(
        &self,
        property_id: Option<&str>,
        period: &str,
    ) -> AgentResponse {
        let task = format!(
            "Generate a marketing performance report.\n\n\
             {}\nPeriod: {period}\n\n\
             Include:\n\
             1. Executive summary of key metrics\n\
             2. Lead generation performance\n\
             3. Campaign performance breakdown\n\
             4. Lead source analysis\n\
             5. Conversion funnel analysis\n\
             6. ROI analysis\n\
             7. Recommendations for the next period\n\n\
             Write it so it can go straight to an executive.",
            scope(property_id)
        );
        let request = with_property(
            AgentRequest::system(task).with_context("period", period),
            property_id,
        );
        self.runtime
            .execute_as("generate_marketing_report", &request)
            .await
    }

    pub async fn track_conversion_event(
        &self,
        lead_id: &str,
        conversion_type: &str,
    ) -> AgentResponse {
        let task = format!(
            "Track a {conversion_type} conversion for lead {lead_id}.\n\n\
             Steps:\n\
             1. Get the lead information and source\n\
             2. Report the conversion to the ad platform\n\n\
             Confirm the conversion was tracked."
        );
        let request = AgentRequest::system(task)
            .with_context("lead_id", lead_id)
            .with_context("conversion_type", conversion_type);
        self.runtime
            .execute_as("track_conversion_event", &request)
            .await
    }
}
