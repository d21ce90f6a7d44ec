//! Tour scheduling tools backed by the tour book

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::info;

use super::{ParamKind, ToolBackends, ToolHandler, ToolRegistry, ToolSchema, date_arg, opt_str, str_arg};
use crate::stores::{LeadActivity, LeadStatus, LeadStore, TourBook, TourRequest};

pub fn register(registry: &mut ToolRegistry, backends: &ToolBackends) {
    registry.register(Arc::new(CheckAvailabilityTool {
        tours: backends.tours.clone(),
    }));
    registry.register(Arc::new(ScheduleTourTool {
        tours: backends.tours.clone(),
        leads: backends.leads.clone(),
    }));
    registry.register(Arc::new(RescheduleTourTool {
        tours: backends.tours.clone(),
        leads: backends.leads.clone(),
    }));
    registry.register(Arc::new(CancelTourTool {
        tours: backends.tours.clone(),
        leads: backends.leads.clone(),
    }));
}

const DATE_HELP: &str = "Date in YYYY-MM-DD format";
const SLOT_HELP: &str = "Time slot, e.g. \"10:00 AM\" or \"2:30 PM\"";

pub struct CheckAvailabilityTool {
    tours: TourBook,
}

#[async_trait]
impl ToolHandler for CheckAvailabilityTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "check_availability",
            "Check whether a tour time slot is open. Dates must be today or within the next 60 days.",
        )
        .required("date", ParamKind::String, DATE_HELP)
        .required("time_slot", ParamKind::String, SLOT_HELP)
        .optional("property_id", ParamKind::String, "Property to tour")
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
        let date = date_arg(&args, "date")?;
        let slot = str_arg(&args, "time_slot")?;
        let availability = self
            .tours
            .check_availability(date, slot, opt_str(&args, "property_id"))
            .await?;
        serde_json::to_value(availability).context("Failed to serialize availability")
    }
}

pub struct ScheduleTourTool {
    tours: TourBook,
    leads: Arc<dyn LeadStore>,
}

#[async_trait]
impl ToolHandler for ScheduleTourTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new("schedule_tour", "Book a property tour for a lead.")
            .required("lead_id", ParamKind::String, "ID of the lead")
            .required("date", ParamKind::String, DATE_HELP)
            .required("time_slot", ParamKind::String, SLOT_HELP)
            .optional("property_id", ParamKind::String, "Property to tour")
            .optional("notes", ParamKind::String, "Notes for the tour guide")
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
        let lead_id = str_arg(&args, "lead_id")?;
        let date = date_arg(&args, "date")?;
        let lead = self
            .leads
            .get(lead_id)
            .await?
            .ok_or_else(|| anyhow!("Lead {} not found", lead_id))?;

        let tour = self
            .tours
            .schedule(TourRequest {
                lead_id: lead_id.to_string(),
                date,
                time_slot: str_arg(&args, "time_slot")?.to_string(),
                property_id: opt_str(&args, "property_id")
                    .map(str::to_string)
                    .or(lead.property_id),
                notes: opt_str(&args, "notes").map(str::to_string),
            })
            .await?;

        // Never move a lead backwards in the funnel
        if !lead.status.reached(LeadStatus::TourScheduled) {
            self.leads
                .update(lead_id, Box::new(|l| l.status = LeadStatus::TourScheduled))
                .await?;
        }
        self.leads
            .record_activity(LeadActivity::new(
                lead_id,
                "tour_scheduled",
                format!("Tour scheduled for {} at {}", tour.date, tour.time_slot),
                json!({"tour_id": tour.id}),
            ))
            .await?;
        info!("Tour {} booked for lead {}", tour.id, lead_id);

        Ok(json!({
            "tour_id": tour.id,
            "lead_id": lead_id,
            "date": tour.date,
            "time_slot": tour.time_slot,
            "property_id": tour.property_id,
            "message": format!("Tour scheduled for {} at {}", tour.date, tour.time_slot),
        }))
    }
}

pub struct RescheduleTourTool {
    tours: TourBook,
    leads: Arc<dyn LeadStore>,
}

#[async_trait]
impl ToolHandler for RescheduleTourTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new("reschedule_tour", "Move an existing tour to a new date and time slot.")
            .required("tour_id", ParamKind::String, "ID of the tour")
            .required("new_date", ParamKind::String, DATE_HELP)
            .required("new_time", ParamKind::String, SLOT_HELP)
            .optional("reason", ParamKind::String, "Why the tour is moving")
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
        let tour_id = str_arg(&args, "tour_id")?;
        let date = date_arg(&args, "new_date")?;
        let slot = str_arg(&args, "new_time")?;
        let reason = opt_str(&args, "reason");

        let moved = self.tours.reschedule(tour_id, date, slot).await?;
        self.leads
            .record_activity(LeadActivity::new(
                moved.tour.lead_id.clone(),
                "tour_rescheduled",
                format!(
                    "Tour moved from {} at {} to {} at {}",
                    moved.previous_date, moved.previous_time_slot, moved.tour.date, moved.tour.time_slot
                ),
                json!({"tour_id": tour_id, "reason": reason}),
            ))
            .await?;

        Ok(json!({
            "tour_id": tour_id,
            "lead_id": moved.tour.lead_id,
            "old_date": moved.previous_date,
            "old_time": moved.previous_time_slot,
            "new_date": moved.tour.date,
            "new_time": moved.tour.time_slot,
        }))
    }
}

pub struct CancelTourTool {
    tours: TourBook,
    leads: Arc<dyn LeadStore>,
}

#[async_trait]
impl ToolHandler for CancelTourTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new("cancel_tour", "Cancel a scheduled tour.")
            .required("tour_id", ParamKind::String, "ID of the tour")
            .optional("reason", ParamKind::String, "Why the tour was cancelled")
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
        let tour_id = str_arg(&args, "tour_id")?;
        let reason = opt_str(&args, "reason");

        let tour = self.tours.cancel(tour_id).await?;
        self.leads
            .record_activity(LeadActivity::new(
                tour.lead_id.clone(),
                "tour_cancelled",
                format!("Tour cancelled for {} at {}", tour.date, tour.time_slot),
                json!({"tour_id": tour_id, "reason": reason}),
            ))
            .await?;

        Ok(json!({
            "tour_id": tour_id,
            "lead_id": tour.lead_id,
            "status": tour.status,
            "reason": reason,
        }))
    }
}
