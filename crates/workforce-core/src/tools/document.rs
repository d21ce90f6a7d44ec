//! Knowledge base tools

use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::{Map, Value, json};

use super::{ParamKind, ToolBackends, ToolHandler, ToolRegistry, ToolSchema, opt_str, opt_u64, str_arg};
use crate::stores::DocumentStore;

pub fn register(registry: &mut ToolRegistry, backends: &ToolBackends) {
    registry.register(Arc::new(SearchKnowledgeBaseTool {
        documents: backends.documents.clone(),
    }));
    registry.register(Arc::new(GetDocumentTool {
        documents: backends.documents.clone(),
    }));
    registry.register(Arc::new(AnswerQuestionTool {
        documents: backends.documents.clone(),
    }));
    registry.register(Arc::new(ListDocumentsTool {
        documents: backends.documents.clone(),
    }));
}

const NO_ANSWER: &str = "No matching documents. Consult the property management documentation or a supervisor.";

fn limit(args: &Map<String, Value>, name: &str, default: usize, max: usize) -> usize {
    opt_u64(args, name)
        .map(|n| n as usize)
        .unwrap_or(default)
        .clamp(1, max)
}

pub struct SearchKnowledgeBaseTool {
    documents: Arc<dyn DocumentStore>,
}

#[async_trait]
impl ToolHandler for SearchKnowledgeBaseTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "search_knowledge_base",
            "Full-text search over policies, procedures, training and lease documents.",
        )
        .required("query", ParamKind::String, "Search terms")
        .optional("property_id", ParamKind::String, "Limit to documents for this property")
        .optional("limit", ParamKind::Integer, "Maximum results (default 5)")
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
        let query = str_arg(&args, "query")?;
        let results = self
            .documents
            .search(query, opt_str(&args, "property_id"), limit(&args, "limit", 5, 20))
            .await?;
        Ok(json!({"query": query, "count": results.len(), "results": results}))
    }
}

pub struct GetDocumentTool {
    documents: Arc<dyn DocumentStore>,
}

#[async_trait]
impl ToolHandler for GetDocumentTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new("get_document", "Fetch the full text of a document.")
            .required("doc_id", ParamKind::String, "ID of the document")
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
        let doc_id = str_arg(&args, "doc_id")?;
        let document = self
            .documents
            .get(doc_id)
            .await?
            .ok_or_else(|| anyhow!("Document {} not found", doc_id))?;
        Ok(serde_json::to_value(document)?)
    }
}

/// Retrieves the passages most likely to answer a question. The model composes
/// the final answer from them and cites the sources.
pub struct AnswerQuestionTool {
    documents: Arc<dyn DocumentStore>,
}

#[async_trait]
impl ToolHandler for AnswerQuestionTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "answer_question",
            "Retrieve the document passages that answer a question, with sources and a confidence level.",
        )
        .required("question", ParamKind::String, "The question")
        .optional("property_id", ParamKind::String, "Property the question is about")
        .optional("context_limit", ParamKind::Integer, "Passages to retrieve (default 3)")
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
        let question = str_arg(&args, "question")?;
        let passages = self
            .documents
            .search(
                question,
                opt_str(&args, "property_id"),
                limit(&args, "context_limit", 3, 10),
            )
            .await?;

        if passages.is_empty() {
            return Ok(json!({
                "question": question,
                "passages": [],
                "sources": [],
                "confidence": "low",
                "note": NO_ANSWER,
            }));
        }

        let sources: Vec<Value> = passages
            .iter()
            .map(|p| json!({"doc_id": p.document_id, "title": p.title, "relevance_score": p.score}))
            .collect();
        let confidence = if passages.len() >= 2 { "high" } else { "medium" };
        Ok(json!({
            "question": question,
            "passages": passages
                .iter()
                .enumerate()
                .map(|(i, p)| format!("[Source {}] {}", i + 1, p.snippet))
                .collect::<Vec<_>>(),
            "sources": sources,
            "confidence": confidence,
        }))
    }
}

pub struct ListDocumentsTool {
    documents: Arc<dyn DocumentStore>,
}

#[async_trait]
impl ToolHandler for ListDocumentsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new("list_documents", "List available documents, optionally filtered.")
            .optional("property_id", ParamKind::String, "Property filter")
            .optional("document_type", ParamKind::String, "Type filter, e.g. policy or procedure")
            .optional("limit", ParamKind::Integer, "Maximum results (default 20)")
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
        let property_id = opt_str(&args, "property_id");
        let document_type = opt_str(&args, "document_type");
        let documents = self
            .documents
            .list(property_id, document_type, limit(&args, "limit", 20, 100))
            .await?;

        let listing: Vec<Value> = documents
            .iter()
            .map(|d| {
                json!({
                    "id": d.id,
                    "title": d.title,
                    "document_type": d.document_type,
                    "property_id": d.property_id,
                })
            })
            .collect();
        Ok(json!({
            "count": listing.len(),
            "documents": listing,
            "filters": {"property_id": property_id, "document_type": document_type},
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::{Document, IndexedDocumentStore};
    use chrono::Utc;

    fn documents() -> Arc<dyn DocumentStore> {
        let doc = |id: &str, title: &str, content: &str| Document {
            id: id.into(),
            title: title.into(),
            document_type: "policy".into(),
            property_id: None,
            content: content.into(),
            created_at: Utc::now(),
        };
        Arc::new(
            IndexedDocumentStore::new(vec![
                doc("d1", "Pet Policy", "Two pets maximum. Pet rent is $35 per month."),
                doc("d2", "Guest Policy", "Guests may stay up to 14 days. Pets visiting must be registered."),
            ])
            .unwrap(),
        )
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_answer_question_cites_sources() {
        let tool = AnswerQuestionTool {
            documents: documents(),
        };
        let out = tool
            .execute(args(json!({"question": "What is the pet rent?"})))
            .await
            .unwrap();
        assert_eq!(out["sources"][0]["doc_id"], "d1");
        assert!(out["passages"][0].as_str().unwrap().starts_with("[Source 1]"));
    }

    #[tokio::test]
    async fn test_answer_question_without_matches() {
        let tool = AnswerQuestionTool {
            documents: documents(),
        };
        let out = tool
            .execute(args(json!({"question": "parking garage"})))
            .await
            .unwrap();
        assert_eq!(out["confidence"], "low");
        assert!(out["sources"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_and_list() {
        let store = documents();
        let got = GetDocumentTool {
            documents: store.clone(),
        }
        .execute(args(json!({"doc_id": "d2"})))
        .await
        .unwrap();
        assert_eq!(got["title"], "Guest Policy");

        let listed = ListDocumentsTool { documents: store }
            .execute(Map::new())
            .await
            .unwrap();
        assert_eq!(listed["count"], 2);
    }
}
