//! Transactional email delivery over an HTTP send API.

use async_trait::async_trait;
use base64::Engine;
use serde_json::json;

use super::NotifyError;
use crate::config::MailConfig;

/// A file attached to an email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// An outbound email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
    pub attachments: Vec<Attachment>,
}

/// Sends email.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), NotifyError>;
}

/// Posts messages as JSON to a transactional email endpoint with a bearer
/// token. Attachments travel base64-encoded.
#[derive(Debug, Clone)]
pub struct HttpMailer {
    api_url: String,
    api_key: String,
    from_address: String,
    from_name: String,
    client: reqwest::Client,
}

impl HttpMailer {
    pub fn new(config: &MailConfig) -> Self {
        Self {
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            from_address: config.from_address.clone(),
            from_name: config.from_name.clone(),
            client: reqwest::Client::new(),
        }
    }

    fn payload(&self, email: &Email) -> serde_json::Value {
        let attachments: Vec<serde_json::Value> = email
            .attachments
            .iter()
            .map(|a| {
                json!({
                    "filename": a.filename,
                    "content_type": a.content_type,
                    "content": base64::engine::general_purpose::STANDARD.encode(&a.content),
                })
            })
            .collect();
        json!({
            "from": { "email": self.from_address, "name": self.from_name },
            "to": [{ "email": email.to }],
            "subject": email.subject,
            "text": email.text,
            "html": email.html.as_deref().unwrap_or(&email.text),
            "attachments": attachments,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &Email) -> Result<(), NotifyError> {
        if self.api_url.trim().is_empty() {
            return Err(NotifyError::Mail("mail delivery is not configured".to_owned()));
        }
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&self.payload(email))
            .send()
            .await
            .map_err(|e| NotifyError::Mail(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Mail(format!("send failed ({status}): {body}")));
        }
        tracing::info!(subject = %email.subject, "email sent");
        Ok(())
    }
}
