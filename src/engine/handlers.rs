//! Handlers that expand due job records into pool jobs.
//!
//! Every handler loads its parameters once at entry; missing required
//! fields fail the job with a handler error, which the engine logs while
//! leaving the record undone for the next tick.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::email::{Contact, Recipient};
use crate::engine::context::HandlerContext;
use crate::engine::params::load_params;
use crate::models::EmailTemplate;
use crate::store::Record;
use crate::template;
use crate::zoom::models::EventType;
use crate::zoom::ZoomJob;
use crate::{AppError, Result};

/// Relation targets: job records point at templates in `email_basic`,
/// recipient rows point at people in `members`.
const TEMPLATE_RELATION: (&str, &str) = ("email_template", "email_basic");
const MEMBER_RELATION: (&str, &str) = ("member", "members");

/// Send a templated email to every member of the job's filtered recipient
/// set, one message version per recipient.
pub async fn email_send(ctx: &HandlerContext, record: &mut Record) -> Result<()> {
    let collection = record.get_string("collection");
    let filter = record.get_string("filter");
    ctx.store.expand(record, &[TEMPLATE_RELATION]).await?;
    let template = expanded_template(record)?;

    let rows = ctx.store.find_by_filter(&collection, &filter, "", 0, 0).await?;
    let main_params = load_params(record);

    let mut tos = Vec::with_capacity(rows.len());
    for mut row in rows {
        ctx.store.expand(&mut row, &[MEMBER_RELATION]).await?;
        let member = row
            .expanded_one("member")
            .ok_or_else(|| AppError::Handler(format!("row {} has no member", row.id())))?;

        let mut params = main_params.clone();
        params.insert("join_url".into(), Value::String(row.get_string("join_url")));

        let mut to = Recipient::new(
            member.get_string("email"),
            format!(
                "{} {}",
                member.get_string("first_name"),
                member.get_string("last_name")
            ),
            member.get_string("first_name"),
        );
        to.params = params;
        tos.push(to);
    }

    info!(recipients = tos.len(), job = record.id(), "submitting templated email");
    ctx.email
        .send(&tos, &template.subject, &template.html, None)
        .await
}

#[derive(Debug, Deserialize)]
struct MeetingStartParams {
    meeting_id: i64,
    occurrence_id: i64,
    #[serde(default)]
    emails: Vec<Map<String, Value>>,
    #[serde(default)]
    cc: Vec<Contact>,
}

#[derive(Debug, Deserialize)]
struct WebinarStartParams {
    webinar_id: i64,
    #[serde(default)]
    emails: Vec<Map<String, Value>>,
    #[serde(default)]
    cc: Vec<Contact>,
}

/// Email the host start link for one meeting occurrence to an admin list.
pub async fn admin_start_meeting(ctx: &HandlerContext, record: &mut Record) -> Result<()> {
    let params: MeetingStartParams = record
        .unmarshal_json_field("params")
        .map_err(|err| AppError::Handler(format!("admin_start_meeting params: {err}")))?;

    let descriptor = ctx
        .zoom
        .event_descriptor(
            EventType::Meeting,
            &params.meeting_id.to_string(),
            Some(&params.occurrence_id.to_string()),
        )
        .await
        .map_err(|err| AppError::Zoom(err.to_string()))?;

    start_link_fanout(ctx, record, descriptor, &params.emails, &params.cc).await
}

/// Email the host start link for one webinar to an admin list.
pub async fn admin_start_webinar(ctx: &HandlerContext, record: &mut Record) -> Result<()> {
    let params: WebinarStartParams = record
        .unmarshal_json_field("params")
        .map_err(|err| AppError::Handler(format!("admin_start_webinar params: {err}")))?;

    let descriptor = ctx
        .zoom
        .event_descriptor(EventType::Webinar, &params.webinar_id.to_string(), None)
        .await
        .map_err(|err| AppError::Zoom(err.to_string()))?;

    start_link_fanout(ctx, record, descriptor, &params.emails, &params.cc).await
}

async fn start_link_fanout(
    ctx: &HandlerContext,
    record: &mut Record,
    descriptor: crate::zoom::models::EventDescriptor,
    emails: &[Map<String, Value>],
    cc: &[Contact],
) -> Result<()> {
    ctx.store.expand(record, &[TEMPLATE_RELATION]).await?;
    let template = expanded_template(record)?;

    let recipients: Vec<Recipient> = emails
        .iter()
        .map(|entry| {
            let first_name = string_field(entry, "first_name");
            let last_name = string_field(entry, "last_name");
            let mut recipient = Recipient::new(
                string_field(entry, "email"),
                format!("{first_name} {last_name}"),
                first_name,
            );
            recipient.cc = cc.to_vec();
            recipient
        })
        .collect();

    if recipients.is_empty() {
        return Err(AppError::Handler(format!(
            "job {} has no start-link recipients",
            record.id()
        )));
    }

    info!(
        recipients = recipients.len(),
        topic = %descriptor.topic,
        job = record.id(),
        "queueing start-link distribution"
    );
    ctx.zoom_pool.enqueue(ZoomJob::DistributeStartLink {
        email: Arc::clone(&ctx.email),
        descriptor,
        recipients,
        template,
    })
}

/// Send a templated text message to every member of the job's filtered
/// recipient set, one SMS pool job per recipient.
pub async fn sms_send(ctx: &HandlerContext, record: &mut Record) -> Result<()> {
    let collection = record.get_string("collection");
    let filter = record.get_string("filter");
    ctx.store.expand(record, &[TEMPLATE_RELATION]).await?;
    let template = expanded_template(record)?;

    let main_params = load_params(record);
    let from_number = match main_params.get("from_number") {
        Some(Value::String(number)) if !number.is_empty() => number.clone(),
        _ => {
            return Err(AppError::Handler(
                "from_number parameter is required and must be a string".into(),
            ))
        }
    };

    // Convert the HTML body once; placeholders survive into the text form.
    let text_template = template::html_to_text(&template.html);

    let rows = ctx.store.find_by_filter(&collection, &filter, "", 0, 0).await?;
    let mut queued = 0usize;
    for mut row in rows {
        ctx.store.expand(&mut row, &[MEMBER_RELATION]).await?;
        let member = row
            .expanded_one("member")
            .ok_or_else(|| AppError::Handler(format!("row {} has no member", row.id())))?;

        let phone = member.get_string("phone");
        if phone.is_empty() {
            debug!(row = row.id(), "skipping recipient with no phone number");
            continue;
        }

        let mut params = main_params.clone();
        params.insert("join_url".into(), Value::String(row.get_string("join_url")));
        params.insert(
            "first_name".into(),
            Value::String(member.get_string("first_name")),
        );
        params.insert(
            "last_name".into(),
            Value::String(member.get_string("last_name")),
        );
        params.insert("email".into(), Value::String(member.get_string("email")));

        let content = template::render(&text_template, &params);
        ctx.sms_pool.enqueue(crate::sms::SmsJob::Send {
            client: Arc::clone(&ctx.sms),
            to_number: phone,
            from_number: from_number.clone(),
            content,
        })?;
        queued += 1;
    }

    info!(queued, job = record.id(), "sms jobs enqueued");
    Ok(())
}

fn expanded_template(record: &Record) -> Result<EmailTemplate> {
    record
        .expanded_one("email_template")
        .map(EmailTemplate::from_record)
        .ok_or_else(|| {
            warn!(job = record.id(), "job record has no email template");
            AppError::Handler(format!("job {} has no email template", record.id()))
        })
}

fn string_field(entry: &Map<String, Value>, key: &str) -> String {
    match entry.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
