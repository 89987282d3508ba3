//! SMS provider HTTP client.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::config::SmsConfig;
use crate::pool::JobError;
use crate::sms::phone::normalize_phone;

/// Delivery status reported by the provider.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MessageStatus {
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct MessageEnvelope {
    data: MessageStatus,
}

/// HTTP client for the OpenPhone messages API.
pub struct OpenPhoneClient {
    http: Client,
    api_base: String,
    api_key: String,
}

impl OpenPhoneClient {
    /// Create a client from SMS configuration.
    #[must_use]
    pub fn new(config: &SmsConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build reqwest client");
        Self {
            http,
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
        }
    }

    /// Send one text message. The recipient number is normalized to E.164
    /// before submission and the provider inbox entry is marked done.
    ///
    /// # Errors
    ///
    /// `JobError::RateLimited` on HTTP 429, `JobError::Timeout` on
    /// transport timeouts, `JobError::Permanent` on any other non-2xx
    /// status or unparseable response.
    pub async fn send_message(
        &self,
        to: &str,
        from: &str,
        content: &str,
    ) -> Result<MessageStatus, JobError> {
        let formatted = normalize_phone(to);
        let body = serde_json::json!({
            "to": [formatted],
            "from": from,
            "content": content,
            "setInboxStatus": "done",
        });

        let response = self
            .http
            .post(format!("{}/messages", self.api_base))
            .header("Authorization", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| JobError::from_transport(&err))?;

        match response.status() {
            status if status.is_success() => {
                let envelope: MessageEnvelope = response.json().await.map_err(|err| {
                    JobError::Permanent(format!("message response parse failed: {err}"))
                })?;
                debug!(to = %formatted, status = %envelope.data.status, "sms submitted");
                Ok(envelope.data)
            }
            StatusCode::TOO_MANY_REQUESTS => Err(JobError::RateLimited),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(JobError::Permanent(format!(
                    "provider returned {status}: {body}"
                )))
            }
        }
    }
}
