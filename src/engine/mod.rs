//! Scheduled job engine.
//!
//! Wakes on the half hour, selects due job records from `scheduled_jobs`,
//! dispatches each by its persisted function name, and flips `done` on
//! success. Dispatch is at-least-once: a failed handler leaves the record
//! undone and the leeway window guarantees it reappears next tick, so
//! handlers must tolerate re-execution.

pub mod context;
pub mod handlers;
pub mod invoice;
pub mod params;

use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub use context::HandlerContext;

use crate::store::Record;

/// Leeway subtracted from the window start so a tick that fires a few
/// seconds late still sees jobs scheduled right on the boundary.
const SELECTION_LEEWAY_MINUTES: i64 = 1;

/// Registry of persisted function names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobFunction {
    EmailSend,
    AdminStartMeeting,
    AdminStartWebinar,
    SmsSend,
}

impl JobFunction {
    /// Resolve a persisted function name; `None` for unknown names.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "email_send" => Some(Self::EmailSend),
            "admin_start_meeting" => Some(Self::AdminStartMeeting),
            "admin_start_webinar" => Some(Self::AdminStartWebinar),
            "sms_send" => Some(Self::SmsSend),
            _ => None,
        }
    }

    /// The persisted name this variant dispatches on.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::EmailSend => "email_send",
            Self::AdminStartMeeting => "admin_start_meeting",
            Self::AdminStartWebinar => "admin_start_webinar",
            Self::SmsSend => "sms_send",
        }
    }
}

/// Periodic dispatcher over the `scheduled_jobs` collection.
pub struct JobEngine {
    ctx: Arc<HandlerContext>,
    window: Duration,
}

impl JobEngine {
    /// Build an engine with the given look-ahead window (also the tick
    /// period).
    #[must_use]
    pub fn new(ctx: Arc<HandlerContext>, window_minutes: i64) -> Self {
        Self {
            ctx,
            window: Duration::minutes(window_minutes),
        }
    }

    /// Run one tick: select due jobs, dispatch sequentially, mark done.
    ///
    /// Handler errors never abort the tick; the failed record stays undone
    /// and is retried on a later tick. Returns the number of records whose
    /// handler completed successfully.
    pub async fn tick(&self) -> usize {
        let now = Utc::now();
        let records = match self.select_due(now).await {
            Ok(records) => records,
            Err(err) => {
                error!(%err, "failed to fetch scheduled jobs");
                return 0;
            }
        };
        info!(due = records.len(), "scheduled jobs selected");

        let mut completed = 0usize;
        for mut record in records {
            let name = record.get_string("function");
            let Some(function) = JobFunction::from_name(&name) else {
                warn!(job = record.id(), function = %name, "unknown scheduled job function");
                continue;
            };

            match self.dispatch(function, &mut record).await {
                Ok(()) => {
                    record.set("done", true);
                    record.set_datetime("last_run", Utc::now());
                    if let Err(err) = self.ctx.store.save(&record).await {
                        error!(job = record.id(), %err, "failed to mark job as done");
                    } else {
                        completed += 1;
                    }
                }
                Err(err) => {
                    warn!(job = record.id(), function = %name, %err, "handler failed; job left undone");
                }
            }
        }
        completed
    }

    async fn select_due(&self, now: DateTime<Utc>) -> crate::Result<Vec<Record>> {
        let lo = (now - Duration::minutes(SELECTION_LEEWAY_MINUTES))
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        let hi = (now + self.window).to_rfc3339_opts(SecondsFormat::Secs, true);
        let filter = format!("done = false AND run_at >= '{lo}' AND run_at <= '{hi}'");
        self.ctx
            .store
            .find_by_filter("scheduled_jobs", &filter, "", 0, 0)
            .await
    }

    async fn dispatch(&self, function: JobFunction, record: &mut Record) -> crate::Result<()> {
        match function {
            JobFunction::EmailSend => handlers::email_send(&self.ctx, record).await,
            JobFunction::AdminStartMeeting => handlers::admin_start_meeting(&self.ctx, record).await,
            JobFunction::AdminStartWebinar => handlers::admin_start_webinar(&self.ctx, record).await,
            JobFunction::SmsSend => handlers::sms_send(&self.ctx, record).await,
        }
    }

    /// The engine's look-ahead window.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }
}

/// Spawn the engine loop: sleep to the next period boundary (on the minute,
/// aligned to the epoch so a 30-minute window ticks at :00 and :30), run a
/// tick, repeat. Ticks are serialized by construction.
#[must_use]
pub fn spawn_engine_task(engine: JobEngine, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = engine
            .window
            .num_seconds()
            .max(60);
        loop {
            let wait = until_next_boundary(Utc::now(), period);
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("job engine shutting down");
                    return;
                }
                () = tokio::time::sleep(wait) => {}
            }
            engine.tick().await;
        }
    })
}

/// Seconds until the next multiple of `period_secs` past the epoch.
fn until_next_boundary(now: DateTime<Utc>, period_secs: i64) -> std::time::Duration {
    let into_period = now.timestamp().rem_euclid(period_secs);
    let wait = period_secs - into_period;
    std::time::Duration::from_secs(wait.unsigned_abs())
}
