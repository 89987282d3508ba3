//! Wire types for the conference provider API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which provider surface an event lives on. Selects both the REST path
/// segment and the batch-status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Meeting,
    Webinar,
}

impl EventType {
    /// REST path segment (`meetings` / `webinars`).
    #[must_use]
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::Meeting => "meetings",
            Self::Webinar => "webinars",
        }
    }

    /// Singular label used in log fields.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Meeting => "meeting",
            Self::Webinar => "webinar",
        }
    }
}

/// A person to register for a meeting or webinar occurrence.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Attendee {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

/// Success payload of a registration call (HTTP 201).
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RegistrationResponse {
    pub registrant_id: String,
    pub id: i64,
    pub topic: String,
    pub start_time: String,
    pub join_url: String,
}

/// A registration outcome paired with the attendee email, so callers can
/// correlate responses arriving out of submission order.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationResult {
    pub response: RegistrationResponse,
    pub email: String,
}

/// One registrant reference inside a batched status update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistrantStatus {
    pub id: String,
    pub email: String,
}

/// Body of `PUT /{segment}/{id}/registrants/status`.
#[derive(Debug, Serialize)]
pub struct StatusUpdateRequest {
    pub action: &'static str,
    pub registrants: Vec<RegistrantStatus>,
}

/// Descriptor of a single meeting or webinar used for start-link emails.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EventDescriptor {
    pub start_url: String,
    pub topic: String,
    /// RFC 3339 start time as the provider formats it.
    pub start_time: String,
    /// Duration in minutes.
    pub duration: i64,
}

/// One scheduled instance of a recurring meeting.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MeetingOccurrence {
    pub occurrence_id: String,
    pub start_time: DateTime<Utc>,
    /// Duration in minutes.
    pub duration: i64,
    pub status: String,
}

/// Occurrence listing returned by `GET /meetings/{id}`.
#[derive(Debug, Deserialize)]
pub struct OccurrenceList {
    #[serde(default)]
    pub occurrences: Vec<MeetingOccurrence>,
}

impl OccurrenceList {
    /// First occurrence still marked `available`, in listing order.
    #[must_use]
    pub fn first_available(self) -> Option<MeetingOccurrence> {
        self.occurrences
            .into_iter()
            .find(|occurrence| occurrence.status == "available")
    }
}

/// OAuth token endpoint response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
}
