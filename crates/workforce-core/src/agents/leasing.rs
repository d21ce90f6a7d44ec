//! Leasing specialist: lead qualification, tours, follow-ups and applications

use std::sync::Arc;

use serde_json::Value;

use crate::runtime::{AgentResponse, AgentRuntime};
use crate::types::AgentRequest;

#[derive(Clone)]
pub struct LeasingAgent {
    runtime: Arc<AgentRuntime>,
}

impl LeasingAgent {
    pub fn new(runtime: Arc<AgentRuntime>) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &AgentRuntime {
        &self.runtime
    }

    pub async fn execute(&self, request: &AgentRequest) -> AgentResponse {
        self.runtime.execute(request).await
    }

    pub async fn qualify_lead(&self, lead_id: &str) -> AgentResponse {
        let task = format!(
            "Qualify the lead with ID {lead_id}.\n\n\
             Steps:\n\
             1. Get the lead information\n\
             2. Analyze their budget, move-in date and requirements\n\
             3. Score the lead\n\
             4. Update the lead status if appropriate\n\
             5. Add a note with a qualification summary\n\n\
             Summarize the lead's qualification status and recommended next steps."
        );
        let request = AgentRequest::system(task).with_context("lead_id", lead_id);
        self.runtime.execute_as("qualify_lead", &request).await
    }

    pub async fn schedule_lead_tour(
        &self,
        lead_id: &str,
        date: &str,
        time_slot: &str,
        property_id: &str,
    ) -> AgentResponse {
        let task = format!(
            "Schedule a tour for lead {lead_id}.\n\n\
             Details:\n\
             - Date: {date}\n\
             - Time: {time_slot}\n\
             - Property: {property_id}\n\n\
             Steps:\n\
             1. Check availability for the requested time\n\
             2. If available, schedule the tour\n\
             3. Send confirmation by SMS and email\n\
             4. Add a note about the scheduled tour\n\n\
             Confirm the tour and its details, or explain why it could not be booked."
        );
        let request = AgentRequest::system(task)
            .with_context("lead_id", lead_id)
            .with_context("date", date)
            .with_context("time_slot", time_slot)
            .with_context("property_id", property_id);
        self.runtime.execute_as("schedule_lead_tour", &request).await
    }

    pub async fn follow_up_with_lead(&self, lead_id: &str, reason: &str) -> AgentResponse {
        let task = format!(
            "Follow up with lead {lead_id} for: {reason}\n\n\
             Steps:\n\
             1. Get the lead information\n\
             2. Choose a follow-up message that fits their status and engagement\n\
             3. Send it through their preferred channel\n\
             4. Log the interaction\n\
             5. Update the lead status if needed\n\n\
             Summarize the follow-up you sent."
        );
        let request = AgentRequest::system(task)
            .with_context("lead_id", lead_id)
            .with_context("follow_up_reason", reason);
        self.runtime.execute_as("follow_up_with_lead", &request).await
    }

    pub async fn handle_tour_request(
        &self,
        lead_id: &str,
        preferred_dates: Option<&str>,
    ) -> AgentResponse {
        let preference = match preferred_dates {
            Some(dates) => format!("Preferred dates/times: {dates}"),
            None => "No specific dates provided.".to_string(),
        };
        let task = format!(
            "Handle a tour request from lead {lead_id}.\n\n\
             {preference}\n\n\
             Steps:\n\
             1. Get the lead information\n\
             2. If dates were given, check availability and book the first open slot\n\
             3. Otherwise offer alternative time slots\n\
             4. Send the confirmation or the options by SMS or email\n\
             5. Add a note about the request\n\n\
             Confirm the booking or describe the next step."
        );
        let mut request = AgentRequest::system(task).with_context("lead_id", lead_id);
        if let Some(dates) = preferred_dates {
            request = request.with_context("preferred_dates", dates);
        }
        self.runtime.execute_as("handle_tour_request", &request).await
    }

    pub async fn process_application(
        &self,
        lead_id: &str,
        application_data: Option<Value>,
    ) -> AgentResponse {
        let task = format!(
            "Process the rental application for lead {lead_id}.\n\n\
             Steps:\n\
             1. Get the lead information\n\
             2. Review the application for completeness\n\
             3. Update the lead status to application_submitted\n\
             4. Send a confirmation to the lead\n\
             5. Add detailed notes about the application\n\n\
             Confirm the application was received and list the next steps."
        );
        let mut request = AgentRequest::system(task).with_context("lead_id", lead_id);
        if let Some(data) = application_data {
            request = request.with_context("application_data", data);
        }
        self.runtime.execute_as("process_application", &request).await
    }
}
