//! Property management specialist: policy Q&A, procedures and training

use std::sync::Arc;

use crate::runtime::{AgentResponse, AgentRuntime};
use crate::types::AgentRequest;

#[derive(Clone)]
pub struct PropertyAgent {
    runtime: Arc<AgentRuntime>,
}

const CITE: &str = "Search the knowledge base first and cite the documents you used.";

impl PropertyAgent {
    pub fn new(runtime: Arc<AgentRuntime>) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &AgentRuntime {
        &self.runtime
    }

    pub async fn execute(&self, request: &AgentRequest) -> AgentResponse {
        self.runtime.execute(request).await
    }

    async fn ask(
        &self,
        action: &str,
        task: String,
        key: &str,
        subject: &str,
        property_id: Option<&str>,
    ) -> AgentResponse {
        let mut request = AgentRequest::system(task).with_context(key, subject);
        if let Some(id) = property_id {
            request = request.with_context("property_id", id);
        }
        self.runtime.execute_as(action, &request).await
    }

    pub async fn answer_policy_question(
        &self,
        question: &str,
        property_id: Option<&str>,
    ) -> AgentResponse {
        let task = format!(
            "Answer this property management question:\n\n{question}\n\n{CITE} \
             Give a clear, accurate answer with practical guidance where it helps."
        );
        self.ask("answer_policy_question", task, "question", question, property_id)
            .await
    }

    pub async fn find_procedure(
        &self,
        procedure_name: &str,
        property_id: Option<&str>,
    ) -> AgentResponse {
        let task = format!(
            "Find the procedure for: {procedure_name}\n\n{CITE} \
             Give the complete procedure as numbered steps, noting any property-specific \
             variations and the forms or documents it needs."
        );
        self.ask("find_procedure", task, "procedure_name", procedure_name, property_id)
            .await
    }

    pub async fn explain_compliance_requirement(&self, requirement: &str) -> AgentResponse {
        let task = format!(
            "Explain the compliance requirement: {requirement}\n\n{CITE} \
             Explain it in plain terms, how to comply, and common mistakes to avoid."
        );
        self.ask(
            "explain_compliance_requirement",
            task,
            "requirement",
            requirement,
            None,
        )
        .await
    }

    pub async fn provide_training_guidance(
        &self,
        topic: &str,
        property_id: Option<&str>,
    ) -> AgentResponse {
        let task = format!(
            "Provide training guidance on: {topic}\n\n{CITE} \
             Outline the learning objectives, then give step-by-step guidance with \
             examples and best practices."
        );
        self.ask("provide_training_guidance", task, "topic", topic, property_id)
            .await
    }

    pub async fn lookup_lease_term(&self, term: &str, property_id: Option<&str>) -> AgentResponse {
        let task = format!(
            "Look up and explain the lease term: {term}\n\n{CITE} \
             Explain what it means in plain language and what it implies for residents \
             and the property."
        );
        self.ask("lookup_lease_term", task, "term", term, property_id)
            .await
    }

    pub async fn troubleshoot_issue(
        &self,
        issue_description: &str,
        property_id: Option<&str>,
    ) -> AgentResponse {
        let task = format!(
            "Help troubleshoot this issue: {issue_description}\n\n{CITE} \
             List likely causes, step-by-step troubleshooting, and when to escalate."
        );
        self.ask(
            "troubleshoot_issue",
            task,
            "issue_description",
            issue_description,
            property_id,
        )
        .await
    }

    pub async fn get_document_summary(&self, document_id: &str) -> AgentResponse {
        let task = format!(
            "Summarize document {document_id}.\n\n\
             Retrieve it, then give its type and purpose, the key points, and anything \
             staff must not miss."
        );
        self.ask("get_document_summary", task, "document_id", document_id, None)
            .await
    }
}
