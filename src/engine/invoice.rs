//! Daily invoice-reminder sweep.
//!
//! Matches open invoices against reminder templates by days-to-due bucket,
//! substitutes the due-date and autopay placeholders locally, and sends one
//! email per invoice.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::engine::context::HandlerContext;
use crate::models::EmailTemplate;
use crate::template;
use crate::timefmt;
use crate::Result;

/// UTC hour of the daily sweep.
const SWEEP_HOUR: u32 = 11;

/// Notice substituted for `{{params.is_auto_pay}}` on autopay invoices.
const AUTOPAY_NOTICE: &str =
    "<bold>Note:</bold> This invoice will be automatically billed to your card on the due date.<br>";

/// Send due reminders for open invoices. Returns the number sent.
///
/// # Errors
///
/// Returns a store error when the template or invoice query fails;
/// per-invoice send failures are logged and skipped.
pub async fn run_invoice_reminders(ctx: &HandlerContext) -> Result<usize> {
    let templates = ctx
        .store
        .find_by_filter("email_basic", "days != NONE", "", 0, 0)
        .await?;
    let by_days: HashMap<i64, EmailTemplate> = templates
        .iter()
        .map(EmailTemplate::from_record)
        .filter_map(|template| template.days.map(|days| (days, template)))
        .collect();
    if by_days.is_empty() {
        info!("no reminder templates configured");
        return Ok(0);
    }

    let invoices = ctx
        .store
        .find_by_filter("invoices", "status = 'open'", "", 0, 0)
        .await?;

    let today = Utc::now().date_naive();
    let mut sent = 0usize;
    for invoice in invoices {
        let Some(due) = invoice.get_datetime("duedate") else {
            warn!(invoice = invoice.id(), "open invoice has no due date");
            continue;
        };
        let days_remaining = (due.date_naive() - today).num_days();
        let Some(template) = by_days.get(&days_remaining) else {
            continue;
        };

        let mut params = Map::new();
        params.insert(
            "DueDate".into(),
            Value::String(timefmt::format_due_date(due)),
        );
        params.insert(
            "is_auto_pay".into(),
            Value::String(if invoice.get_bool("auto_pay") {
                AUTOPAY_NOTICE.to_owned()
            } else {
                String::new()
            }),
        );
        params.insert(
            "first_name".into(),
            Value::String(invoice.get_string("first_name")),
        );

        let subject = template::render(&template.subject, &params);
        let html = template::render(&template.html, &params);

        let to = crate::email::Recipient::new(
            invoice.get_string("email"),
            format!(
                "{} {}",
                invoice.get_string("first_name"),
                invoice.get_string("last_name")
            ),
            invoice.get_string("first_name"),
        );
        if let Err(err) = ctx.email.send(&[to], &subject, &html, None).await {
            error!(invoice = invoice.id(), %err, "reminder send failed");
            continue;
        }
        sent += 1;
    }

    info!(sent, "invoice reminder sweep complete");
    Ok(sent)
}

/// Spawn the daily reminder task, firing at [`SWEEP_HOUR`] UTC.
#[must_use]
pub fn spawn_invoice_task(ctx: HandlerContext, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let wait = until_next_daily_hour(Utc::now(), SWEEP_HOUR);
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("invoice reminder task shutting down");
                    return;
                }
                () = tokio::time::sleep(wait) => {}
            }
            if let Err(err) = run_invoice_reminders(&ctx).await {
                error!(%err, "invoice reminder sweep failed");
            }
        }
    })
}

/// Time until the next occurrence of `hour:00` UTC.
fn until_next_daily_hour(now: DateTime<Utc>, hour: u32) -> std::time::Duration {
    let today = now
        .date_naive()
        .and_hms_opt(hour, 0, 0)
        .expect("valid hour");
    let candidate = chrono::TimeZone::from_utc_datetime(&Utc, &today);
    let candidate = if candidate <= now {
        candidate + chrono::Duration::days(1)
    } else {
        candidate
    };
    (candidate - now).to_std().unwrap_or_default()
}
