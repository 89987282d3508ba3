//! Conference-pool job variants.
//!
//! Heterogeneous work items sharing the Zoom pool queue. Each variant owns
//! its result plumbing; the worker only sees `execute` and the error
//! classification.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::email::{BrevoClient, Recipient};
use crate::models::EmailTemplate;
use crate::pool::{JobError, PoolJob};
use crate::timefmt;
use crate::zoom::aggregator::StatusEvent;
use crate::zoom::api::ZoomClient;
use crate::zoom::models::{
    Attendee, EventDescriptor, EventType, RegistrantStatus, RegistrationResult,
};

/// Minutes an admin start link stays valid, for display purposes.
const START_LINK_TTL_MINUTES: i64 = 120;

/// Work items executed by the Zoom worker pool.
pub enum ZoomJob {
    /// Register one attendee; on success, report the result to the caller
    /// and feed the status aggregator.
    RegisterAttendee {
        client: Arc<ZoomClient>,
        event_type: EventType,
        event_id: String,
        occurrence_id: Option<String>,
        attendee: Attendee,
        /// Result channel the submitting caller awaits (buffered per batch).
        resp_tx: mpsc::Sender<RegistrationResult>,
        /// Permanent-failure channel; transient failures stay in the pool.
        err_tx: mpsc::Sender<JobError>,
        /// Aggregator input; `None` when no status approval is needed.
        status_tx: Option<mpsc::Sender<StatusEvent>>,
    },
    /// Approve a batch of registrants in one API call.
    UpdateRegistrantStatus {
        client: Arc<ZoomClient>,
        event_type: EventType,
        event_id: String,
        registrants: Vec<RegistrantStatus>,
    },
    /// Email host start links to a recipient list for one meeting/webinar.
    DistributeStartLink {
        email: Arc<BrevoClient>,
        descriptor: EventDescriptor,
        recipients: Vec<Recipient>,
        template: EmailTemplate,
    },
}

impl PoolJob for ZoomJob {
    fn execute(
        &self,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<(), JobError>> + Send + '_>> {
        Box::pin(async move {
            match self {
                Self::RegisterAttendee {
                    client,
                    event_type,
                    event_id,
                    occurrence_id,
                    attendee,
                    resp_tx,
                    err_tx,
                    status_tx,
                } => {
                    register_attendee(
                        client,
                        *event_type,
                        event_id,
                        occurrence_id.as_deref(),
                        attendee,
                        resp_tx,
                        err_tx,
                        status_tx.as_ref(),
                        &cancel,
                    )
                    .await
                }
                Self::UpdateRegistrantStatus {
                    client,
                    event_type,
                    event_id,
                    registrants,
                } => {
                    client
                        .update_registrant_status(*event_type, event_id, registrants.clone())
                        .await
                }
                Self::DistributeStartLink {
                    email,
                    descriptor,
                    recipients,
                    template,
                } => distribute_start_link(email, descriptor, recipients, template).await,
            }
        })
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::RegisterAttendee { .. } => "register_attendee",
            Self::UpdateRegistrantStatus { .. } => "update_registrant_status",
            Self::DistributeStartLink { .. } => "distribute_start_link",
        }
    }
}

#[allow(clippy::too_many_arguments)] // Variant fields threaded through; not public API width.
async fn register_attendee(
    client: &ZoomClient,
    event_type: EventType,
    event_id: &str,
    occurrence_id: Option<&str>,
    attendee: &Attendee,
    resp_tx: &mpsc::Sender<RegistrationResult>,
    err_tx: &mpsc::Sender<JobError>,
    status_tx: Option<&mpsc::Sender<StatusEvent>>,
    cancel: &CancellationToken,
) -> Result<(), JobError> {
    let result = client
        .register_attendee(event_type, event_id, occurrence_id, attendee)
        .await;

    let response = match result {
        Ok(response) => response,
        // Transient failures stay inside the pool: the job is requeued and
        // the caller hears nothing until a definitive outcome exists.
        Err(err) if err.is_transient() => return Err(err),
        Err(err) => {
            if err_tx.send(err.clone()).await.is_err() {
                debug!(email = %attendee.email, "caller gone before failure report");
            }
            return Err(err);
        }
    };

    if let Some(status_tx) = status_tx {
        let event = StatusEvent {
            event_id: event_id.to_owned(),
            event_type,
            registrant_id: response.registrant_id.clone(),
            email: attendee.email.clone(),
        };
        tokio::select! {
            () = cancel.cancelled() => return Err(JobError::Timeout),
            sent = status_tx.send(event) => {
                if sent.is_err() {
                    warn!(email = %attendee.email, "status aggregator gone; approval event dropped");
                }
            }
        }
    }

    let result = RegistrationResult {
        response,
        email: attendee.email.clone(),
    };
    tokio::select! {
        () = cancel.cancelled() => Err(JobError::Timeout),
        sent = resp_tx.send(result) => {
            if sent.is_err() {
                debug!(email = %attendee.email, "caller gone before result delivery");
            }
            Ok(())
        }
    }
}

/// Render per-recipient start-link parameters and submit one multi-version
/// email. The provider substitutes `{{params.X}}` per message version.
async fn distribute_start_link(
    email: &BrevoClient,
    descriptor: &EventDescriptor,
    recipients: &[Recipient],
    template: &EmailTemplate,
) -> Result<(), JobError> {
    let start_time_est = match chrono::DateTime::parse_from_rfc3339(&descriptor.start_time) {
        Ok(start) => timefmt::format_eastern(start.with_timezone(&Utc)),
        Err(err) => {
            warn!(raw = %descriptor.start_time, %err, "unparseable start time; passing through");
            descriptor.start_time.clone()
        }
    };
    let link_expires_at =
        timefmt::format_eastern(Utc::now() + Duration::minutes(START_LINK_TTL_MINUTES));

    let tos: Vec<Recipient> = recipients
        .iter()
        .map(|recipient| {
            let mut to = recipient.clone();
            to.params
                .insert("start_url".into(), Value::String(descriptor.start_url.clone()));
            to.params
                .insert("topic".into(), Value::String(descriptor.topic.clone()));
            to.params
                .insert("start_time".into(), Value::String(descriptor.start_time.clone()));
            to.params
                .insert("start_time_est".into(), Value::String(start_time_est.clone()));
            to.params
                .insert("link_expires_at".into(), Value::String(link_expires_at.clone()));
            to.params
                .insert("duration".into(), Value::Number(descriptor.duration.into()));
            to
        })
        .collect();

    email
        .send(&tos, &template.subject, &template.html, None)
        .await
        .map_err(|err| JobError::Permanent(err.to_string()))
}
