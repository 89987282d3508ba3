//! Conference provider HTTP client.
//!
//! All methods classify failures into the pool taxonomy: HTTP 429 is the
//! rate-limit signal, transport timeouts are retryable, and every other
//! non-success status is permanent and carries the response body.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::config::ZoomConfig;
use crate::pool::JobError;
use crate::zoom::auth::TokenCache;
use crate::zoom::models::{
    Attendee, EventDescriptor, EventType, MeetingOccurrence, OccurrenceList, RegistrantStatus,
    RegistrationResponse, StatusUpdateRequest,
};

/// HTTP client for the conference provider REST API.
pub struct ZoomClient {
    http: Client,
    api_base: String,
    token: TokenCache,
}

impl ZoomClient {
    /// Create a client from provider configuration.
    #[must_use]
    pub fn new(config: &ZoomConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build reqwest client");
        Self {
            api_base: config.api_base.clone(),
            token: TokenCache::new(config, http.clone()),
            http,
        }
    }

    /// Register one attendee for a webinar, or for a meeting occurrence when
    /// `occurrence_id` is given. Meetings are auto-approved at registration.
    ///
    /// # Errors
    ///
    /// `JobError::RateLimited` on HTTP 429, `JobError::Timeout` on transport
    /// timeouts, `JobError::Permanent` otherwise.
    pub async fn register_attendee(
        &self,
        event_type: EventType,
        event_id: &str,
        occurrence_id: Option<&str>,
        attendee: &Attendee,
    ) -> Result<RegistrationResponse, JobError> {
        let token = self.token.access_token().await?;
        let mut url = format!(
            "{}/{}/{}/registrants",
            self.api_base,
            event_type.path_segment(),
            event_id
        );
        if let Some(occurrence) = occurrence_id {
            url.push_str(&format!("?occurrence_ids={occurrence}"));
        }

        let mut body = serde_json::json!({
            "first_name": attendee.first_name,
            "last_name": attendee.last_name,
            "email": attendee.email,
            "phone": attendee.phone,
        });
        if event_type == EventType::Meeting {
            body["auto_approve"] = serde_json::Value::Bool(true);
        }

        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|err| JobError::from_transport(&err))?;

        match response.status() {
            StatusCode::CREATED => response
                .json::<RegistrationResponse>()
                .await
                .map_err(|err| JobError::Permanent(format!("registration parse failed: {err}"))),
            StatusCode::TOO_MANY_REQUESTS => Err(JobError::RateLimited),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(JobError::Permanent(format!(
                    "provider returned {status}: {body}"
                )))
            }
        }
    }

    /// Approve a batch of registrants on the per-event-type status endpoint.
    ///
    /// # Errors
    ///
    /// `JobError::RateLimited` on HTTP 429, `JobError::Timeout` on transport
    /// timeouts, `JobError::Permanent` on any other non-204 status.
    pub async fn update_registrant_status(
        &self,
        event_type: EventType,
        event_id: &str,
        registrants: Vec<RegistrantStatus>,
    ) -> Result<(), JobError> {
        let token = self.token.access_token().await?;
        let url = format!(
            "{}/{}/{}/registrants/status",
            self.api_base,
            event_type.path_segment(),
            event_id
        );
        let count = registrants.len();
        let request = StatusUpdateRequest {
            action: "approve",
            registrants,
        };

        let response = self
            .http
            .put(url)
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(|err| JobError::from_transport(&err))?;

        match response.status() {
            StatusCode::NO_CONTENT => {
                debug!(event_id, event_type = event_type.as_str(), count, "status batch approved");
                Ok(())
            }
            StatusCode::TOO_MANY_REQUESTS => Err(JobError::RateLimited),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(JobError::Permanent(format!(
                    "status update returned {status}: {body}"
                )))
            }
        }
    }

    /// Fetch the descriptor of a meeting, optionally qualified to one
    /// occurrence, or of a webinar.
    ///
    /// # Errors
    ///
    /// Classified as for the other calls; non-200 is permanent.
    pub async fn event_descriptor(
        &self,
        event_type: EventType,
        event_id: &str,
        occurrence_id: Option<&str>,
    ) -> Result<EventDescriptor, JobError> {
        let token = self.token.access_token().await?;
        let mut url = format!(
            "{}/{}/{}",
            self.api_base,
            event_type.path_segment(),
            event_id
        );
        if let Some(occurrence) = occurrence_id {
            url.push_str(&format!("?occurrence_id={occurrence}"));
        }

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| JobError::from_transport(&err))?;

        match response.status() {
            StatusCode::OK => response
                .json::<EventDescriptor>()
                .await
                .map_err(|err| JobError::Permanent(format!("descriptor parse failed: {err}"))),
            StatusCode::TOO_MANY_REQUESTS => Err(JobError::RateLimited),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(JobError::Permanent(format!(
                    "descriptor fetch returned {status}: {body}"
                )))
            }
        }
    }

    /// First occurrence of a recurring meeting still marked `available`.
    ///
    /// # Errors
    ///
    /// `JobError::Permanent` when the listing has no available occurrence.
    pub async fn first_available_occurrence(
        &self,
        meeting_id: &str,
    ) -> Result<MeetingOccurrence, JobError> {
        let token = self.token.access_token().await?;
        let url = format!("{}/meetings/{meeting_id}", self.api_base);

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| JobError::from_transport(&err))?;

        match response.status() {
            StatusCode::OK => {
                let listing: OccurrenceList = response.json().await.map_err(|err| {
                    JobError::Permanent(format!("occurrence list parse failed: {err}"))
                })?;
                listing.first_available().ok_or_else(|| {
                    JobError::Permanent(format!("meeting {meeting_id} has no available occurrence"))
                })
            }
            StatusCode::TOO_MANY_REQUESTS => Err(JobError::RateLimited),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(JobError::Permanent(format!(
                    "occurrence fetch returned {status}: {body}"
                )))
            }
        }
    }
}
