//! Policy and procedure documents with full-text search

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tantivy::{
    Index, IndexWriter, ReloadPolicy, TantivyDocument,
    collector::TopDocs,
    query::QueryParser,
    schema::{Field, OwnedValue, STORED, STRING, Schema, TEXT, Value as _},
};
use tracing::{debug, info, warn};

const SNIPPET_CHARS: usize = 300;

/// A knowledge-base document. Documents without a property apply to every property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub document_type: String,
    #[serde(default)]
    pub property_id: Option<String>,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Document {
    fn applies_to(&self, property_id: Option<&str>) -> bool {
        match (property_id, self.property_id.as_deref()) {
            (None, _) | (_, None) => true,
            (Some(wanted), Some(own)) => wanted == own,
        }
    }
}

/// A ranked search hit with its most relevant paragraph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    pub document_id: String,
    pub title: String,
    pub document_type: String,
    pub property_id: Option<String>,
    pub score: f32,
    pub snippet: String,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn search(&self, query: &str, property_id: Option<&str>, limit: usize) -> Result<Vec<Passage>>;

    async fn get(&self, document_id: &str) -> Result<Option<Document>>;

    async fn list(
        &self,
        property_id: Option<&str>,
        document_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Document>>;
}

/// Documents held in memory and indexed in an in-RAM tantivy index
pub struct IndexedDocumentStore {
    index: Index,
    id_field: Field,
    title_field: Field,
    content_field: Field,
    documents: RwLock<HashMap<String, Document>>,
}

impl IndexedDocumentStore {
    pub fn new(documents: Vec<Document>) -> Result<Self> {
        let mut schema_builder = Schema::builder();
        let id_field = schema_builder.add_text_field("id", STRING | STORED);
        let title_field = schema_builder.add_text_field("title", TEXT);
        let content_field = schema_builder.add_text_field("content", TEXT);
        let schema = schema_builder.build();

        let store = Self {
            index: Index::create_in_ram(schema),
            id_field,
            title_field,
            content_field,
            documents: RwLock::new(HashMap::new()),
        };

        let count = documents.len();
        store.insert_all(documents)?;
        info!("Indexed {} documents", count);
        Ok(store)
    }

    /// Add or replace documents and commit them to the index
    pub fn insert_all(&self, documents: Vec<Document>) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }
        let mut writer = self.get_writer()?;
        for doc in &documents {
            writer.delete_term(tantivy::Term::from_field_text(self.id_field, &doc.id));

            let mut indexed = TantivyDocument::default();
            indexed.add_text(self.id_field, &doc.id);
            indexed.add_text(self.title_field, &doc.title);
            indexed.add_text(self.content_field, &doc.content);
            writer.add_document(indexed)?;
        }
        writer.commit().context("Failed to commit document index")?;

        let mut map = self.documents.write().unwrap_or_else(|poisoned| {
            warn!("Document map lock was poisoned, recovering");
            poisoned.into_inner()
        });
        for doc in documents {
            debug!("Indexed document: {} ({})", doc.id, doc.document_type);
            map.insert(doc.id.clone(), doc);
        }
        Ok(())
    }

    fn get_writer(&self) -> Result<IndexWriter> {
        self.index
            .writer(50_000_000)
            .context("Failed to create index writer")
    }

    fn snapshot(&self) -> HashMap<String, Document> {
        self.documents
            .read()
            .unwrap_or_else(|poisoned| {
                warn!("Document map lock was poisoned, recovering");
                poisoned.into_inner()
            })
            .clone()
    }

    fn search_index(&self, query_str: &str, limit: usize) -> Result<Vec<(f32, String)>> {
        let reader = self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .context("Failed to open index reader")?;
        let searcher = reader.searcher();

        let parser = QueryParser::for_index(&self.index, vec![self.title_field, self.content_field]);
        let (query, errors) = parser.parse_query_lenient(query_str);
        if !errors.is_empty() {
            debug!("Ignored {} query syntax errors in '{}'", errors.len(), query_str);
        }

        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;
        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let retrieved: TantivyDocument = searcher.doc(address)?;
            if let Some(id) = retrieved
                .get_first(self.id_field)
                .and_then(|v: &OwnedValue| v.as_str())
            {
                hits.push((score, id.to_string()));
            }
        }
        Ok(hits)
    }
}

fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(|t| t.to_lowercase())
        .collect()
}

/// Paragraph sharing the most terms with the query, clipped for display
pub fn best_snippet(content: &str, query: &str) -> String {
    let query_terms = terms(query);
    let best = content
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .max_by_key(|paragraph| {
            let words = terms(paragraph);
            query_terms.iter().filter(|t| words.contains(t)).count()
        })
        .unwrap_or(content);

    if best.chars().count() <= SNIPPET_CHARS {
        best.to_string()
    } else {
        let clipped: String = best.chars().take(SNIPPET_CHARS - 3).collect();
        format!("{}...", clipped)
    }
}

#[async_trait]
impl DocumentStore for IndexedDocumentStore {
    async fn search(&self, query: &str, property_id: Option<&str>, limit: usize) -> Result<Vec<Passage>> {
        if query.trim().is_empty() {
            bail!("Search query is empty");
        }
        let documents = self.snapshot();
        // Over-fetch so property filtering still leaves `limit` hits
        let hits = self.search_index(query, documents.len().max(limit))?;

        let passages: Vec<Passage> = hits
            .into_iter()
            .filter_map(|(score, id)| documents.get(&id).map(|doc| (score, doc)))
            .filter(|(_, doc)| doc.applies_to(property_id))
            .take(limit)
            .map(|(score, doc)| Passage {
                document_id: doc.id.clone(),
                title: doc.title.clone(),
                document_type: doc.document_type.clone(),
                property_id: doc.property_id.clone(),
                score,
                snippet: best_snippet(&doc.content, query),
            })
            .collect();

        debug!("Search for '{}' returned {} passages", query, passages.len());
        Ok(passages)
    }

    async fn get(&self, document_id: &str) -> Result<Option<Document>> {
        Ok(self.snapshot().remove(document_id))
    }

    async fn list(
        &self,
        property_id: Option<&str>,
        document_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Document>> {
        let mut docs: Vec<Document> = self
            .snapshot()
            .into_values()
            .filter(|d| d.applies_to(property_id))
            .filter(|d| document_type.is_none_or(|t| d.document_type == t))
            .collect();
        docs.sort_by(|a, b| a.title.cmp(&b.title));
        docs.truncate(limit);
        Ok(docs)
    }
}
