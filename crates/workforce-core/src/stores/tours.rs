//! Tour book: a single-owner actor over the tour ledger
//!
//! All bookings flow through one task that owns the [`TourLedger`]. Handles are
//! cheap clones holding the command sender; each request carries a oneshot
//! reply channel. Capacity checks and inserts happen inside the same command,
//! so two concurrent bookings can never both take the last seat of a slot.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum TourError {
    #[error("Tour not found: {0}")]
    NotFound(String),

    #[error("Tour {0} is cancelled")]
    Cancelled(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("Tour book is not running")]
    Closed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TourStatus {
    Scheduled,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tour {
    pub id: String,
    pub lead_id: String,
    pub date: NaiveDate,
    pub time_slot: String,
    pub property_id: Option<String>,
    pub notes: Option<String>,
    pub status: TourStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Booking limits
#[derive(Debug, Clone, Copy)]
pub struct TourPolicy {
    pub max_per_slot: usize,
    pub horizon_days: i64,
}

impl Default for TourPolicy {
    fn default() -> Self {
        Self {
            max_per_slot: 3,
            horizon_days: 60,
        }
    }
}

/// Answer to an availability check
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Availability {
    pub available: bool,
    pub date: NaiveDate,
    pub time_slot: String,
    pub property_id: Option<String>,
    pub booked: usize,
    pub capacity: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// New booking request
#[derive(Debug, Clone)]
pub struct TourRequest {
    pub lead_id: String,
    pub date: NaiveDate,
    pub time_slot: String,
    pub property_id: Option<String>,
    pub notes: Option<String>,
}

/// Result of moving a tour to a new slot
#[derive(Debug, Clone, Serialize)]
pub struct Rescheduled {
    pub tour: Tour,
    pub previous_date: NaiveDate,
    pub previous_time_slot: String,
}

/// Pure booking state. Only the actor task touches it.
#[derive(Debug, Default)]
pub struct TourLedger {
    policy: TourPolicy,
    tours: HashMap<String, Tour>,
}

impl TourLedger {
    pub fn new(policy: TourPolicy) -> Self {
        Self {
            policy,
            tours: HashMap::new(),
        }
    }

    /// Check a slot. `exclude` leaves one tour out of the count (used when rescheduling it).
    pub fn availability(
        &self,
        today: NaiveDate,
        date: NaiveDate,
        time_slot: &str,
        property_id: Option<&str>,
        exclude: Option<&str>,
    ) -> Availability {
        let time_slot = time_slot.trim();
        let booked = self
            .tours
            .values()
            .filter(|t| t.status == TourStatus::Scheduled)
            .filter(|t| Some(t.id.as_str()) != exclude)
            .filter(|t| t.date == date && t.time_slot == time_slot)
            .filter(|t| t.property_id.as_deref() == property_id)
            .count();

        let reason = if date < today {
            Some("Date is in the past".to_string())
        } else if date > today + Duration::days(self.policy.horizon_days) {
            Some(format!(
                "Date is too far in the future (max {} days)",
                self.policy.horizon_days
            ))
        } else if booked >= self.policy.max_per_slot {
            Some("Time slot is fully booked".to_string())
        } else {
            None
        };

        Availability {
            available: reason.is_none(),
            date,
            time_slot: time_slot.to_string(),
            property_id: property_id.map(str::to_string),
            booked,
            capacity: self.policy.max_per_slot,
            reason,
        }
    }

    pub fn schedule(&mut self, today: NaiveDate, request: TourRequest) -> Result<Tour, TourError> {
        let check = self.availability(
            today,
            request.date,
            &request.time_slot,
            request.property_id.as_deref(),
            None,
        );
        if let Some(reason) = check.reason {
            return Err(TourError::Unavailable(reason));
        }

        let now = Utc::now();
        let tour = Tour {
            id: uuid::Uuid::new_v4().to_string(),
            lead_id: request.lead_id,
            date: request.date,
            time_slot: check.time_slot,
            property_id: request.property_id,
            notes: request.notes,
            status: TourStatus::Scheduled,
            created_at: now,
            updated_at: now,
        };
        self.tours.insert(tour.id.clone(), tour.clone());
        Ok(tour)
    }

    pub fn reschedule(
        &mut self,
        today: NaiveDate,
        tour_id: &str,
        date: NaiveDate,
        time_slot: &str,
    ) -> Result<Rescheduled, TourError> {
        let property_id = match self.tours.get(tour_id) {
            None => return Err(TourError::NotFound(tour_id.to_string())),
            Some(t) if t.status == TourStatus::Cancelled => {
                return Err(TourError::Cancelled(tour_id.to_string()));
            }
            Some(t) => t.property_id.clone(),
        };

        let check = self.availability(today, date, time_slot, property_id.as_deref(), Some(tour_id));
        if let Some(reason) = check.reason {
            return Err(TourError::Unavailable(reason));
        }

        let tour = self
            .tours
            .get_mut(tour_id)
            .ok_or_else(|| TourError::NotFound(tour_id.to_string()))?;
        let previous_date = tour.date;
        let previous_time_slot = std::mem::replace(&mut tour.time_slot, check.time_slot);
        tour.date = date;
        tour.updated_at = Utc::now();

        Ok(Rescheduled {
            tour: tour.clone(),
            previous_date,
            previous_time_slot,
        })
    }

    pub fn cancel(&mut self, tour_id: &str) -> Result<Tour, TourError> {
        let tour = self
            .tours
            .get_mut(tour_id)
            .ok_or_else(|| TourError::NotFound(tour_id.to_string()))?;
        if tour.status == TourStatus::Cancelled {
            return Err(TourError::Cancelled(tour_id.to_string()));
        }
        tour.status = TourStatus::Cancelled;
        tour.updated_at = Utc::now();
        Ok(tour.clone())
    }

    pub fn get(&self, tour_id: &str) -> Option<&Tour> {
        self.tours.get(tour_id)
    }

    pub fn for_lead(&self, lead_id: &str) -> Vec<Tour> {
        let mut tours: Vec<Tour> = self
            .tours
            .values()
            .filter(|t| t.lead_id == lead_id)
            .cloned()
            .collect();
        tours.sort_by(|a, b| a.date.cmp(&b.date).then(a.created_at.cmp(&b.created_at)));
        tours
    }
}

enum TourCommand {
    Availability {
        date: NaiveDate,
        time_slot: String,
        property_id: Option<String>,
        reply: oneshot::Sender<Availability>,
    },
    Schedule {
        request: TourRequest,
        reply: oneshot::Sender<Result<Tour, TourError>>,
    },
    Reschedule {
        tour_id: String,
        date: NaiveDate,
        time_slot: String,
        reply: oneshot::Sender<Result<Rescheduled, TourError>>,
    },
    Cancel {
        tour_id: String,
        reply: oneshot::Sender<Result<Tour, TourError>>,
    },
    Get {
        tour_id: String,
        reply: oneshot::Sender<Option<Tour>>,
    },
    ForLead {
        lead_id: String,
        reply: oneshot::Sender<Vec<Tour>>,
    },
}

/// Handle to the tour book task. Clone freely; the task stops when the last handle drops.
#[derive(Clone)]
pub struct TourBook {
    tx: mpsc::Sender<TourCommand>,
}

impl TourBook {
    /// Spawn the owning task on the current tokio runtime
    pub fn spawn(policy: TourPolicy) -> Self {
        let (tx, mut rx) = mpsc::channel::<TourCommand>(64);

        tokio::spawn(async move {
            let mut ledger = TourLedger::new(policy);
            info!(
                "Tour book started (max {} per slot, {} day horizon)",
                policy.max_per_slot, policy.horizon_days
            );

            while let Some(cmd) = rx.recv().await {
                let today = Utc::now().date_naive();
                match cmd {
                    TourCommand::Availability {
                        date,
                        time_slot,
                        property_id,
                        reply,
                    } => {
                        let _ = reply.send(ledger.availability(
                            today,
                            date,
                            &time_slot,
                            property_id.as_deref(),
                            None,
                        ));
                    }
                    TourCommand::Schedule { request, reply } => {
                        let result = ledger.schedule(today, request);
                        match &result {
                            Ok(tour) => debug!("Scheduled tour {} for {}", tour.id, tour.lead_id),
                            Err(e) => debug!("Tour not scheduled: {}", e),
                        }
                        let _ = reply.send(result);
                    }
                    TourCommand::Reschedule {
                        tour_id,
                        date,
                        time_slot,
                        reply,
                    } => {
                        let _ = reply.send(ledger.reschedule(today, &tour_id, date, &time_slot));
                    }
                    TourCommand::Cancel { tour_id, reply } => {
                        let _ = reply.send(ledger.cancel(&tour_id));
                    }
                    TourCommand::Get { tour_id, reply } => {
                        let _ = reply.send(ledger.get(&tour_id).cloned());
                    }
                    TourCommand::ForLead { lead_id, reply } => {
                        let _ = reply.send(ledger.for_lead(&lead_id));
                    }
                }
            }

            debug!("Tour book stopped");
        });

        Self { tx }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> TourCommand,
    ) -> Result<T, TourError> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(build(reply)).await.is_err() {
            warn!("Tour book channel closed");
            return Err(TourError::Closed);
        }
        rx.await.map_err(|_| TourError::Closed)
    }

    pub async fn check_availability(
        &self,
        date: NaiveDate,
        time_slot: &str,
        property_id: Option<&str>,
    ) -> Result<Availability, TourError> {
        self.request(|reply| TourCommand::Availability {
            date,
            time_slot: time_slot.to_string(),
            property_id: property_id.map(str::to_string),
            reply,
        })
        .await
    }

    pub async fn schedule(&self, request: TourRequest) -> Result<Tour, TourError> {
        self.request(|reply| TourCommand::Schedule { request, reply })
            .await?
    }

    pub async fn reschedule(
        &self,
        tour_id: &str,
        date: NaiveDate,
        time_slot: &str,
    ) -> Result<Rescheduled, TourError> {
        self.request(|reply| TourCommand::Reschedule {
            tour_id: tour_id.to_string(),
            date,
            time_slot: time_slot.to_string(),
            reply,
        })
        .await?
    }

    pub async fn cancel(&self, tour_id: &str) -> Result<Tour, TourError> {
        self.request(|reply| TourCommand::Cancel {
            tour_id: tour_id.to_string(),
            reply,
        })
        .await?
    }

    pub async fn get(&self, tour_id: &str) -> Result<Option<Tour>, TourError> {
        self.request(|reply| TourCommand::Get {
            tour_id: tour_id.to_string(),
            reply,
        })
        .await
    }

    pub async fn tours_for_lead(&self, lead_id: &str) -> Result<Vec<Tour>, TourError> {
        self.request(|reply| TourCommand::ForLead {
            lead_id: lead_id.to_string(),
            reply,
        })
        .await
    }
}
