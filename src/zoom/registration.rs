//! Member meeting-registration sweep.
//!
//! Runs on the fourth Monday of the month: picks the next available
//! occurrence of the configured member meeting, fans one registration job
//! per eligible member into the Zoom pool, collects the outcomes, and
//! persists one `member_zoom` row per success.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ZoomConfig;
use crate::models::{Member, MemberRegistration};
use crate::pool::PoolHandle;
use crate::store::RecordStore;
use crate::zoom::aggregator::StatusEvent;
use crate::zoom::api::ZoomClient;
use crate::zoom::jobs::ZoomJob;
use crate::zoom::models::{Attendee, EventType};
use crate::{AppError, Result};

/// Counts reported by one registration sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Successful registrations persisted to `member_zoom`.
    pub registered: usize,
    /// Permanent per-member failures.
    pub failed: usize,
}

/// Register all eligible members for the next available occurrence of the
/// member meeting.
///
/// Per-member failures are logged and counted; they do not abort the sweep.
///
/// # Errors
///
/// Returns an error when the occurrence listing or the member query fails,
/// before any job has been enqueued.
pub async fn register_members(
    store: &RecordStore,
    client: &Arc<ZoomClient>,
    pool: &PoolHandle<ZoomJob>,
    status_tx: &mpsc::Sender<StatusEvent>,
    config: &ZoomConfig,
    cancel: &CancellationToken,
) -> Result<SweepOutcome> {
    let occurrence = client
        .first_available_occurrence(&config.member_meeting_id)
        .await
        .map_err(|err| AppError::Zoom(err.to_string()))?;

    let now = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let filter = config.member_filter.replace("{now}", &now);
    let records = store
        .find_by_filter("members", &filter, "-expiration", 0, 0)
        .await?;
    let members: Vec<Member> = records.iter().map(Member::from_record).collect();
    info!(
        members = members.len(),
        occurrence = %occurrence.occurrence_id,
        "starting member registration sweep"
    );

    let end_time = occurrence.start_time + Duration::minutes(occurrence.duration);
    let member_ids_by_email: HashMap<String, String> = members
        .iter()
        .map(|member| (member.email.clone(), member.id.clone()))
        .collect();

    let (resp_tx, mut resp_rx) = mpsc::channel(members.len().max(1));
    let (err_tx, mut err_rx) = mpsc::channel(members.len().max(1));

    let mut outcome = SweepOutcome::default();
    let mut enqueued = 0usize;
    for member in &members {
        let job = ZoomJob::RegisterAttendee {
            client: Arc::clone(client),
            event_type: EventType::Meeting,
            event_id: config.member_meeting_id.clone(),
            occurrence_id: Some(occurrence.occurrence_id.clone()),
            attendee: Attendee {
                first_name: member.first_name.clone(),
                last_name: member.last_name.clone(),
                email: member.email.clone(),
                phone: member.phone.clone(),
            },
            resp_tx: resp_tx.clone(),
            err_tx: err_tx.clone(),
            status_tx: Some(status_tx.clone()),
        };
        match pool.enqueue(job) {
            Ok(()) => enqueued += 1,
            Err(err) => {
                warn!(email = %member.email, %err, "registration enqueue rejected");
                outcome.failed += 1;
            }
        }
    }
    drop(resp_tx);
    drop(err_tx);

    for _ in 0..enqueued {
        tokio::select! {
            () = cancel.cancelled() => {
                warn!(collected = outcome.registered + outcome.failed, "sweep cancelled while collecting results");
                break;
            }
            maybe_result = resp_rx.recv() => {
                let Some(result) = maybe_result else { break };
                let Some(member_id) = member_ids_by_email.get(&result.email) else {
                    warn!(email = %result.email, "registration response for unknown member");
                    continue;
                };
                let registration = MemberRegistration {
                    member_id: member_id.clone(),
                    join_url: result.response.join_url.clone(),
                    start: occurrence.start_time,
                    end: end_time,
                    title: result.response.topic.clone(),
                };
                if let Err(err) = registration.create(store).await {
                    error!(email = %result.email, %err, "failed to persist member registration");
                }
                outcome.registered += 1;
            }
            maybe_err = err_rx.recv() => {
                let Some(err) = maybe_err else { break };
                warn!(%err, "member registration failed");
                outcome.failed += 1;
            }
        }
    }

    info!(
        registered = outcome.registered,
        failed = outcome.failed,
        "member registration sweep complete"
    );
    Ok(outcome)
}

/// Monday falling on days 22–28: the fourth Monday of any month.
#[must_use]
pub fn is_fourth_monday(date: NaiveDate) -> bool {
    date.weekday() == Weekday::Mon && (22..=28).contains(&date.day())
}

/// Time until the next Monday noon, UTC.
#[must_use]
pub fn until_next_monday_noon(now: DateTime<Utc>) -> std::time::Duration {
    let days_ahead = i64::from((7 - now.weekday().num_days_from_monday()) % 7);
    let candidate_date = now.date_naive() + Duration::days(days_ahead);
    let candidate = Utc
        .from_utc_datetime(&candidate_date.and_hms_opt(12, 0, 0).expect("valid time"));
    let candidate = if candidate <= now {
        candidate + Duration::days(7)
    } else {
        candidate
    };
    (candidate - now).to_std().unwrap_or_default()
}

/// Spawn the weekly registration task: wakes every Monday at noon UTC and
/// runs the sweep only on the fourth Monday of the month.
#[must_use]
pub fn spawn_member_registration_task(
    store: RecordStore,
    client: Arc<ZoomClient>,
    pool: PoolHandle<ZoomJob>,
    status_tx: mpsc::Sender<StatusEvent>,
    config: ZoomConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let wait = until_next_monday_noon(Utc::now());
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("member registration task shutting down");
                    return;
                }
                () = tokio::time::sleep(wait) => {}
            }

            if !is_fourth_monday(Utc::now().date_naive()) {
                continue;
            }
            if let Err(err) =
                register_members(&store, &client, &pool, &status_tx, &config, &cancel).await
            {
                error!(%err, "member registration sweep failed");
            }
        }
    })
}
