//! External collaborators backing the tools
//!
//! Each collaborator is a trait with an in-memory implementation. Tools only see
//! the traits, so production adapters can be swapped in without touching them.

pub mod ads;
pub mod analytics;
pub mod documents;
pub mod leads;
pub mod messaging;
pub mod tours;

pub use ads::{
    AdCopy, AdCopyRequest, AdPlatform, Campaign, CampaignInsights, CampaignStatus, CampaignUpdate,
    InMemoryAdPlatform, InMemoryPropertySystem, PropertyRecords, PropertySystem, SyncReport,
};
pub use analytics::{AnalyticsStore, FunnelStage, Period, StoreAnalytics};
pub use documents::{Document, DocumentStore, IndexedDocumentStore, Passage};
pub use leads::{InMemoryLeadStore, Lead, LeadActivity, LeadStatus, LeadStore};
pub use messaging::{MessageGateway, OutboxGateway, SentMessage};
pub use tours::{TourBook, TourError, TourPolicy, TourRequest};
