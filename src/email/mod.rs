//! Transactional email delivery through the Brevo API.
//!
//! One request carries one message version per recipient; the provider
//! substitutes `{{params.X}}` placeholders per version, so a single call
//! fans out to the whole recipient list.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::EmailConfig;
use crate::{AppError, Result};

/// A sender, reply-to, or destination address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contact {
    pub name: String,
    pub email: String,
}

/// One email recipient with per-recipient template parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipient {
    pub email: String,
    /// Full display name.
    pub name: String,
    pub first_name: String,
    /// Per-recipient placeholder values merged into the message version.
    pub params: Map<String, Value>,
    /// Optional carbon copies for this recipient's version.
    pub cc: Vec<Contact>,
}

impl Recipient {
    /// Recipient with no extra parameters or CC list.
    #[must_use]
    pub fn new(
        email: impl Into<String>,
        name: impl Into<String>,
        first_name: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            first_name: first_name.into(),
            params: Map::new(),
            cc: Vec::new(),
        }
    }
}

/// Hosted attachment reference.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Attachment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageVersion {
    to: Vec<Contact>,
    params: Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cc: Vec<Contact>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmailPayload<'a> {
    sender: &'a Contact,
    reply_to: &'a Contact,
    subject: &'a str,
    html_content: &'a str,
    message_versions: Vec<MessageVersion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attachment: Option<&'a [Attachment]>,
}

/// HTTP client for the Brevo transactional email API.
pub struct BrevoClient {
    http: Client,
    api_base: String,
    api_key: String,
    sender: Contact,
    reply_to: Contact,
}

impl BrevoClient {
    /// Create a client from email configuration.
    #[must_use]
    pub fn new(config: &EmailConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build reqwest client");
        Self {
            http,
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
            sender: Contact {
                name: config.sender_name.clone(),
                email: config.sender_email.clone(),
            },
            reply_to: Contact {
                name: config.reply_name.clone(),
                email: config.reply_email.clone(),
            },
        }
    }

    /// Send one email to many recipients, one message version each.
    ///
    /// Each version's params start from the recipient identity fields
    /// (`name`, `email`, `first_name`) and are overlaid with the
    /// recipient's own parameter map.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Email` on transport failure or any non-2xx
    /// status, carrying the response body.
    pub async fn send(
        &self,
        to: &[Recipient],
        subject: &str,
        html: &str,
        attachment: Option<&[Attachment]>,
    ) -> Result<()> {
        if to.is_empty() {
            warn!(subject, "email send requested with no recipients");
            return Ok(());
        }

        let message_versions = to
            .iter()
            .map(|recipient| {
                let mut params = Map::new();
                params.insert("name".into(), Value::String(recipient.name.clone()));
                params.insert("email".into(), Value::String(recipient.email.clone()));
                params.insert(
                    "first_name".into(),
                    Value::String(recipient.first_name.clone()),
                );
                for (key, value) in &recipient.params {
                    params.insert(key.clone(), value.clone());
                }
                MessageVersion {
                    to: vec![Contact {
                        name: recipient.name.clone(),
                        email: recipient.email.clone(),
                    }],
                    params,
                    cc: recipient.cc.clone(),
                }
            })
            .collect();

        let payload = EmailPayload {
            sender: &self.sender,
            reply_to: &self.reply_to,
            subject,
            html_content: html,
            message_versions,
            attachment,
        };

        let response = self
            .http
            .post(format!("{}/v3/smtp/email", self.api_base))
            .header("api-key", &self.api_key)
            .header("accept", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|err| AppError::Email(format!("request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Email(format!(
                "API error (status {status}): {body}"
            )));
        }

        debug!(recipients = to.len(), subject, "email submitted");
        Ok(())
    }
}
