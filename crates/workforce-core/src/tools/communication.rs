//! Outbound messaging and interaction logging tools

use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::{Map, Value, json};

use super::{ParamKind, ToolBackends, ToolHandler, ToolRegistry, ToolSchema, opt_str, str_arg};
use crate::stores::{LeadActivity, LeadStore, MessageGateway};

pub fn register(registry: &mut ToolRegistry, backends: &ToolBackends) {
    registry.register(Arc::new(SendSmsTool {
        messages: backends.messages.clone(),
        leads: backends.leads.clone(),
    }));
    registry.register(Arc::new(SendEmailTool {
        messages: backends.messages.clone(),
        leads: backends.leads.clone(),
    }));
    registry.register(Arc::new(LogInteractionTool {
        leads: backends.leads.clone(),
    }));
}

async fn ensure_lead(leads: &dyn LeadStore, lead_id: Option<&str>) -> Result<()> {
    match lead_id {
        Some(id) if leads.get(id).await?.is_none() => Err(anyhow!("Lead {} not found", id)),
        _ => Ok(()),
    }
}

/// Attach an entry to the lead's timeline when the action concerns a lead
async fn note_on_lead(
    leads: &dyn LeadStore,
    lead_id: Option<&str>,
    activity_type: &str,
    description: String,
    metadata: Value,
) -> Result<()> {
    let Some(lead_id) = lead_id else {
        return Ok(());
    };
    ensure_lead(leads, Some(lead_id)).await?;
    leads
        .record_activity(LeadActivity::new(lead_id, activity_type, description, metadata))
        .await
}

pub struct SendSmsTool {
    messages: Arc<dyn MessageGateway>,
    leads: Arc<dyn LeadStore>,
}

#[async_trait]
impl ToolHandler for SendSmsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new("send_sms", "Send an SMS text message to a phone number.")
            .required("phone", ParamKind::String, "Destination phone number")
            .required("message", ParamKind::String, "Message text")
            .optional("lead_id", ParamKind::String, "Lead this message concerns")
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
        let phone = str_arg(&args, "phone")?;
        let message = str_arg(&args, "message")?;
        let lead_id = opt_str(&args, "lead_id");

        ensure_lead(self.leads.as_ref(), lead_id).await?;
        let sent = self.messages.send_sms(phone, message).await?;
        note_on_lead(
            self.leads.as_ref(),
            lead_id,
            "sms_sent",
            format!("SMS sent to {}", phone),
            json!({"message_id": sent.id, "message": message}),
        )
        .await?;

        Ok(json!({
            "message_id": sent.id,
            "phone": phone,
            "status": "sent",
            "sent_at": sent.sent_at,
        }))
    }
}

pub struct SendEmailTool {
    messages: Arc<dyn MessageGateway>,
    leads: Arc<dyn LeadStore>,
}

#[async_trait]
impl ToolHandler for SendEmailTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new("send_email", "Send an email.")
            .required("email", ParamKind::String, "Recipient address")
            .required("subject", ParamKind::String, "Subject line")
            .required("body", ParamKind::String, "Email body")
            .optional("lead_id", ParamKind::String, "Lead this email concerns")
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
        let email = str_arg(&args, "email")?;
        let subject = str_arg(&args, "subject")?;
        let body = str_arg(&args, "body")?;
        let lead_id = opt_str(&args, "lead_id");

        ensure_lead(self.leads.as_ref(), lead_id).await?;
        let sent = self.messages.send_email(email, subject, body).await?;
        note_on_lead(
            self.leads.as_ref(),
            lead_id,
            "email_sent",
            format!("Email sent: {}", subject),
            json!({"message_id": sent.id, "subject": subject}),
        )
        .await?;

        Ok(json!({
            "message_id": sent.id,
            "email": email,
            "subject": subject,
            "status": "sent",
            "sent_at": sent.sent_at,
        }))
    }
}

pub struct LogInteractionTool {
    leads: Arc<dyn LeadStore>,
}

#[async_trait]
impl ToolHandler for LogInteractionTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "log_interaction",
            "Record an interaction with a lead (call, visit, sms, email, etc.).",
        )
        .required("lead_id", ParamKind::String, "ID of the lead")
        .required("interaction_type", ParamKind::String, "Kind of interaction")
        .one_of(&["call", "sms", "email", "visit", "voicemail", "other"])
        .optional("notes", ParamKind::String, "What happened")
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value> {
        let lead_id = str_arg(&args, "lead_id")?;
        let interaction_type = str_arg(&args, "interaction_type")?;
        let notes = opt_str(&args, "notes").unwrap_or_default();

        note_on_lead(
            self.leads.as_ref(),
            Some(lead_id),
            interaction_type,
            if notes.is_empty() {
                format!("{} interaction", interaction_type)
            } else {
                notes.to_string()
            },
            json!({"notes": notes}),
        )
        .await?;

        Ok(json!({
            "lead_id": lead_id,
            "interaction_type": interaction_type,
            "message": "Interaction logged",
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::{InMemoryLeadStore, Lead, OutboxGateway};

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_send_sms_logs_on_lead() {
        let leads = Arc::new(InMemoryLeadStore::with_leads(vec![Lead::new("l1", "Dana")]));
        let outbox = Arc::new(OutboxGateway::new());
        let tool = SendSmsTool {
            messages: outbox.clone(),
            leads: leads.clone(),
        };

        let out = tool
            .execute(args(json!({"phone": "5551234567", "message": "See you at 10", "lead_id": "l1"})))
            .await
            .unwrap();
        assert_eq!(out["status"], "sent");
        assert_eq!(outbox.sent().await.len(), 1);
        assert_eq!(leads.activities("l1").await.unwrap()[0].activity_type, "sms_sent");
    }

    #[tokio::test]
    async fn test_send_email_rejects_bad_address() {
        let tool = SendEmailTool {
            messages: Arc::new(OutboxGateway::new()),
            leads: Arc::new(InMemoryLeadStore::new()),
        };
        let err = tool
            .execute(args(json!({"email": "nobody", "subject": "Hi", "body": "Hello"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid email"));
    }

    #[tokio::test]
    async fn test_log_interaction_unknown_lead() {
        let tool = LogInteractionTool {
            leads: Arc::new(InMemoryLeadStore::new()),
        };
        assert!(
            tool.execute(args(json!({"lead_id": "x", "interaction_type": "call"})))
                .await
                .is_err()
        );
    }
}
