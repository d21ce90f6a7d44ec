//! Outbound SMS and email

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Sms,
    Email,
}

/// A message handed to the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentMessage {
    pub id: String,
    pub channel: Channel,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

/// SMS/email delivery boundary
#[async_trait]
pub trait MessageGateway: Send + Sync {
    async fn send_sms(&self, phone: &str, body: &str) -> Result<SentMessage>;

    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<SentMessage>;
}

/// Reject numbers that cannot be dialed: at least 10 digits, only phone punctuation
pub fn validate_phone(phone: &str) -> Result<()> {
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    let valid_chars = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '(' | ')' | ' ' | '.'));
    if digits < 10 || digits > 15 || !valid_chars {
        bail!("Invalid phone number: {}", phone);
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !email.contains(' ')
        }
        None => false,
    };
    if !valid {
        bail!("Invalid email address: {}", email);
    }
    Ok(())
}

/// Gateway that keeps every message in an outbox instead of delivering it
#[derive(Default)]
pub struct OutboxGateway {
    outbox: RwLock<Vec<SentMessage>>,
}

impl OutboxGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<SentMessage> {
        self.outbox.read().await.clone()
    }

    async fn push(&self, message: SentMessage) -> SentMessage {
        self.outbox.write().await.push(message.clone());
        message
    }
}

#[async_trait]
impl MessageGateway for OutboxGateway {
    async fn send_sms(&self, phone: &str, body: &str) -> Result<SentMessage> {
        validate_phone(phone)?;
        if body.trim().is_empty() {
            bail!("Message body is empty");
        }
        info!("SMS queued to {}", phone);
        Ok(self
            .push(SentMessage {
                id: uuid::Uuid::new_v4().to_string(),
                channel: Channel::Sms,
                to: phone.to_string(),
                subject: None,
                body: body.to_string(),
                sent_at: Utc::now(),
            })
            .await)
    }

    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<SentMessage> {
        validate_email(to)?;
        if body.trim().is_empty() {
            bail!("Message body is empty");
        }
        info!("Email queued to {}", to);
        Ok(self
            .push(SentMessage {
                id: uuid::Uuid::new_v4().to_string(),
                channel: Channel::Email,
                to: to.to_string(),
                subject: Some(subject.to_string()),
                body: body.to_string(),
                sent_at: Utc::now(),
            })
            .await)
    }
}
