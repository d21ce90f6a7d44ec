//! Seed data for the in-memory tool collaborators

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use workforce_core::ToolBackends;
use workforce_core::stores::{
    Campaign, Document, InMemoryAdPlatform, InMemoryLeadStore, InMemoryPropertySystem,
    IndexedDocumentStore, Lead, OutboxGateway, PropertyRecords, StoreAnalytics, TourBook,
    TourPolicy,
};

/// Contents of a fixture file. Every section is optional.
#[derive(Debug, Default, Deserialize)]
pub struct Fixtures {
    #[serde(default)]
    pub leads: Vec<Lead>,
    #[serde(default)]
    pub campaigns: Vec<Campaign>,
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default)]
    pub properties: Vec<PropertyRecords>,
}

impl Fixtures {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixtures at {}", path.display()))?;
        let fixtures: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse fixtures at {}", path.display()))?;
        info!(
            "Loaded fixtures: {} leads, {} campaigns, {} documents, {} properties",
            fixtures.leads.len(),
            fixtures.campaigns.len(),
            fixtures.documents.len(),
            fixtures.properties.len()
        );
        Ok(fixtures)
    }

    /// Build the collaborators. Must run inside a tokio runtime (the tour book is an actor).
    pub fn into_backends(self, tour_policy: TourPolicy) -> Result<ToolBackends> {
        let leads = Arc::new(InMemoryLeadStore::with_leads(self.leads));
        let ads = Arc::new(InMemoryAdPlatform::new(self.campaigns));
        let documents =
            IndexedDocumentStore::new(self.documents).context("Failed to index documents")?;

        Ok(ToolBackends {
            leads: leads.clone(),
            tours: TourBook::spawn(tour_policy),
            analytics: Arc::new(StoreAnalytics::new(leads, ads.clone())),
            documents: Arc::new(documents),
            messages: Arc::new(OutboxGateway::new()),
            ads,
            property_system: Arc::new(InMemoryPropertySystem::new(self.properties)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use workforce_core::stores::LeadStore;

    #[tokio::test]
    async fn test_load_and_build() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(
            file,
            r#"{{
                "leads": [{{"id": "lead-1", "name": "Ana Ruiz", "email": "ana@example.com"}}],
                "campaigns": [{{"id": "c-1", "name": "Spring", "platform": "facebook"}}],
                "documents": [{{"id": "d-1", "title": "Pet Policy", "document_type": "policy",
                                "content": "Two pets maximum."}}],
                "properties": [{{"property_id": "prop-1", "units": 120}}]
            }}"#
        )?;

        let fixtures = Fixtures::load(file.path())?;
        assert_eq!(fixtures.leads.len(), 1);
        let backends = fixtures.into_backends(TourPolicy::default())?;
        let lead = backends.leads.get("lead-1").await?.unwrap();
        assert_eq!(lead.email.as_deref(), Some("ana@example.com"));
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_file_sections_default() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, "{{}}")?;
        let fixtures = Fixtures::load(file.path())?;
        assert!(fixtures.leads.is_empty());
        fixtures.into_backends(TourPolicy::default())?;
        Ok(())
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = Fixtures::load(Path::new("/nonexistent/fixtures.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read fixtures"));
    }
}
