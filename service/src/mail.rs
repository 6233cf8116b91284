//! Transactional email provider client.
//!
//! Sends rendered campaigns through Mailgun's messages API. The provider
//! sits behind the [`Mailer`] trait so campaign orchestration can run
//! against a mock, and so a deployment without provider credentials can
//! skip the network call entirely (simulated sends).

use async_trait::async_trait;
use reqwest::Client;
use tracing::info;

/// Errors from the email provider. Every variant keeps the attempted URL.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MailError {
    #[error("request failed: {message}")]
    Transport { url: String, message: String },

    #[error("provider rejected the message ({status}): {body}")]
    Rejected {
        url: String,
        status: u16,
        body: String,
    },
}

impl MailError {
    pub fn url(&self) -> &str {
        match self {
            MailError::Transport { url, .. } => url,
            MailError::Rejected { url, .. } => url,
        }
    }
}

/// A fully rendered message ready for dispatch.
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to_email: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub html: String,
}

/// Email provider seam. Returns the provider message id on success.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<String, MailError>;
}

/// Mailgun HTTP API client.
pub struct MailgunMailer {
    http: Client,
    base_url: String,
    domain: String,
    api_key: String,
    sender: String,
}

impl MailgunMailer {
    pub fn new(
        base_url: impl Into<String>,
        domain: impl Into<String>,
        api_key: impl Into<String>,
        sender_name: &str,
        sender_email: &str,
    ) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            domain: domain.into(),
            api_key: api_key.into(),
            sender: format_recipient(Some(sender_name), sender_email),
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/v3/{}/messages",
            self.base_url.trim_end_matches('/'),
            self.domain
        )
    }
}

#[async_trait]
impl Mailer for MailgunMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<String, MailError> {
        let url = self.messages_url();
        let to = format_recipient(email.to_name.as_deref(), &email.to_email);

        let response = self
            .http
            .post(&url)
            .basic_auth("api", Some(&self.api_key))
            .form(&[
                ("from", self.sender.as_str()),
                ("to", to.as_str()),
                ("subject", email.subject.as_str()),
                ("html", email.html.as_str()),
            ])
            .send()
            .await
            .map_err(|e| MailError::Transport {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| MailError::Transport {
            url: url.clone(),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(MailError::Rejected {
                url,
                status: status.as_u16(),
                body,
            });
        }

        let message_id = message_id_from_body(&body).unwrap_or_else(|| "unknown".to_string());

        info!(
            to = %email.to_email,
            message_id = %message_id,
            "provider_send_accepted"
        );

        Ok(message_id)
    }
}

/// `"Name <email>"` when a name is present, bare address otherwise.
fn format_recipient(name: Option<&str>, email: &str) -> String {
    match name {
        Some(name) if !name.trim().is_empty() => format!("{} <{}>", name.trim(), email),
        _ => email.to_string(),
    }
}

/// Pull the message id out of the provider's accept body.
///
/// Mailgun wraps ids in angle brackets; those are stripped.
fn message_id_from_body(body: &str) -> Option<String> {
    let parsed: serde_json::Value = serde_json::from_str(body).ok()?;
    let id = parsed.get("id")?.as_str()?;
    let clean = id.trim().trim_matches(|c| c == '<' || c == '>').to_string();
    if clean.is_empty() {
        None
    } else {
        Some(clean)
    }
}
