//! Integration tests for the scheduled job engine and its handlers,
//! running against the in-memory store and local provider stand-ins.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use member_relay::engine::JobEngine;
use member_relay::pool::spawn_pool_worker;

use super::test_helpers::{
    build_context, mem_store, seed_job, seed_member, seed_signup, seed_template, wait_until,
    BrevoStandIn, OpenPhoneStandIn, ZoomStandIn,
};

#[allow(dead_code)] // Not every test touches every stand-in.
struct World {
    store: member_relay::store::RecordStore,
    zoom: ZoomStandIn,
    brevo: BrevoStandIn,
    openphone: OpenPhoneStandIn,
    engine: JobEngine,
    ctx: member_relay::engine::HandlerContext,
    zoom_queue: Option<member_relay::pool::PoolQueue<member_relay::zoom::ZoomJob>>,
    sms_queue: Option<member_relay::pool::PoolQueue<member_relay::sms::SmsJob>>,
}

async fn world() -> World {
    let store = mem_store().await;
    let zoom = ZoomStandIn::start().await;
    let brevo = BrevoStandIn::start().await;
    let openphone = OpenPhoneStandIn::start().await;
    let (ctx, zoom_queue, sms_queue) = build_context(
        store.clone(),
        &zoom.base_url(),
        &brevo.base_url(),
        &openphone.base_url(),
        50.0,
    );
    let engine = JobEngine::new(Arc::new(ctx.clone()), 30);
    World {
        store,
        zoom,
        brevo,
        openphone,
        engine,
        ctx,
        zoom_queue: Some(zoom_queue),
        sms_queue: Some(sms_queue),
    }
}

async fn job_record(world: &World, id: &str) -> member_relay::store::Record {
    world
        .store
        .find_by_id("scheduled_jobs", id)
        .await
        .expect("job record")
}

#[tokio::test]
async fn failed_handler_leaves_job_undone_then_succeeds_next_tick() {
    let world = world().await;
    let template_id = seed_template(&world.store, "Hello", "<p>Hi {{params.first_name}}</p>").await;
    let member_id = seed_member(&world.store, "Ana", "Ruiz", "ana@example.com", "8138194188").await;
    seed_signup(&world.store, &member_id, "https://conf.example/j/1").await;

    let job_id = seed_job(
        &world.store,
        "email_send",
        "event_signups",
        "confirmed = true",
        Some(&template_id),
        Utc::now(),
        json!({"topic": "Town Hall"}),
    )
    .await;

    // First tick: the email provider is down; the job must stay undone.
    world.brevo.fail_next(1);
    world.engine.tick().await;
    let record = job_record(&world, &job_id).await;
    assert!(!record.get_bool("done"));
    assert!(record.get_datetime("last_run").is_none());

    // Second tick: provider recovered; the job completes.
    world.engine.tick().await;
    let record = job_record(&world, &job_id).await;
    assert!(record.get_bool("done"));
    assert!(record.get_datetime("last_run").is_some());
    assert_eq!(world.brevo.requests().len(), 1);
}

#[tokio::test]
async fn completed_jobs_never_rerun() {
    let world = world().await;
    let template_id = seed_template(&world.store, "Hello", "<p>Hi</p>").await;
    let member_id = seed_member(&world.store, "Ana", "Ruiz", "ana@example.com", "").await;
    seed_signup(&world.store, &member_id, "https://conf.example/j/1").await;

    seed_job(
        &world.store,
        "email_send",
        "event_signups",
        "confirmed = true",
        Some(&template_id),
        Utc::now(),
        json!({}),
    )
    .await;

    assert_eq!(world.engine.tick().await, 1);
    assert_eq!(world.engine.tick().await, 0);
    assert_eq!(world.brevo.requests().len(), 1);
}

#[tokio::test]
async fn selection_window_excludes_far_future_and_stale_jobs() {
    let world = world().await;
    let template_id = seed_template(&world.store, "Hello", "<p>Hi</p>").await;
    let member_id = seed_member(&world.store, "Ana", "Ruiz", "ana@example.com", "").await;
    seed_signup(&world.store, &member_id, "https://conf.example/j/1").await;

    let due_soon = seed_job(
        &world.store,
        "email_send",
        "event_signups",
        "confirmed = true",
        Some(&template_id),
        Utc::now() + chrono::Duration::minutes(29),
        json!({}),
    )
    .await;
    let far_future = seed_job(
        &world.store,
        "email_send",
        "event_signups",
        "confirmed = true",
        Some(&template_id),
        Utc::now() + chrono::Duration::minutes(31),
        json!({}),
    )
    .await;
    let stale = seed_job(
        &world.store,
        "email_send",
        "event_signups",
        "confirmed = true",
        Some(&template_id),
        Utc::now() - chrono::Duration::minutes(2),
        json!({}),
    )
    .await;

    world.engine.tick().await;
    assert!(job_record(&world, &due_soon).await.get_bool("done"));
    assert!(!job_record(&world, &far_future).await.get_bool("done"));
    assert!(!job_record(&world, &stale).await.get_bool("done"));
}

#[tokio::test]
async fn unknown_function_is_skipped_and_left_undone() {
    let world = world().await;
    let job_id = seed_job(
        &world.store,
        "fax_send",
        "event_signups",
        "confirmed = true",
        None,
        Utc::now(),
        json!({}),
    )
    .await;

    assert_eq!(world.engine.tick().await, 0);
    assert!(!job_record(&world, &job_id).await.get_bool("done"));
}

#[tokio::test]
async fn email_send_builds_one_version_per_recipient() {
    let world = world().await;
    let template_id =
        seed_template(&world.store, "Join us", "<p>Hi {{params.first_name}}</p>").await;
    let ana = seed_member(&world.store, "Ana", "Ruiz", "ana@example.com", "").await;
    let ben = seed_member(&world.store, "Ben", "Okafor", "ben@example.com", "").await;
    seed_signup(&world.store, &ana, "https://conf.example/j/ana").await;
    seed_signup(&world.store, &ben, "https://conf.example/j/ben").await;

    seed_job(
        &world.store,
        "email_send",
        "event_signups",
        "confirmed = true",
        Some(&template_id),
        Utc::now(),
        json!({"topic": "Q3 Review"}),
    )
    .await;

    world.engine.tick().await;

    let requests = world.brevo.requests();
    assert_eq!(requests.len(), 1);
    let versions = requests[0]["messageVersions"].as_array().unwrap();
    assert_eq!(versions.len(), 2);

    let emails: Vec<&str> = versions
        .iter()
        .map(|v| v["to"][0]["email"].as_str().unwrap())
        .collect();
    assert!(emails.contains(&"ana@example.com"));
    assert!(emails.contains(&"ben@example.com"));

    for version in versions {
        let params = &version["params"];
        assert_eq!(params["topic"], json!("Q3 Review"));
        assert!(params["join_url"].as_str().unwrap().starts_with("https://conf.example/j/"));
        assert!(params["first_name"].is_string());
    }
    assert_eq!(requests[0]["subject"], json!("Join us"));
}

#[tokio::test]
async fn sms_send_renders_plain_text_and_normalizes_phones() {
    let mut world = world().await;
    let ct = CancellationToken::new();
    let sms_queue = world.sms_queue.take().unwrap();
    let worker = spawn_pool_worker(sms_queue, world.ctx.sms_pool.clone(), ct.clone());

    let template_id = seed_template(
        &world.store,
        "Reminder",
        r#"<p>Hi {{params.first_name}}</p><ul><li>Link: <a href="https://x">join</a></li></ul>"#,
    )
    .await;
    let ana = seed_member(&world.store, "Ana", "Ruiz", "ana@example.com", "813-819-4188").await;
    let ben = seed_member(&world.store, "Ben", "Okafor", "ben@example.com", "").await;
    seed_signup(&world.store, &ana, "https://conf.example/j/ana").await;
    seed_signup(&world.store, &ben, "https://conf.example/j/ben").await;

    let job_id = seed_job(
        &world.store,
        "sms_send",
        "event_signups",
        "confirmed = true",
        Some(&template_id),
        Utc::now(),
        json!({"from_number": "+15550001111"}),
    )
    .await;

    world.engine.tick().await;

    // One member has no phone; exactly one message goes out.
    let openphone = &world.openphone;
    assert!(
        wait_until(Duration::from_secs(5), || openphone.messages().len() == 1).await,
        "one sms should be delivered"
    );
    let messages = world.openphone.messages();
    assert_eq!(messages[0]["to"], json!(["+18138194188"]));
    assert_eq!(messages[0]["from"], json!("+15550001111"));
    assert_eq!(messages[0]["setInboxStatus"], json!("done"));
    assert_eq!(
        messages[0]["content"],
        json!("Hi Ana\n\nLink: join\n\n[1] https://x")
    );

    assert!(job_record(&world, &job_id).await.get_bool("done"));

    ct.cancel();
    let _ = worker.await;
}

#[tokio::test]
async fn sms_send_without_from_number_fails_the_job() {
    let world = world().await;
    let template_id = seed_template(&world.store, "Reminder", "<p>Hi</p>").await;
    let ana = seed_member(&world.store, "Ana", "Ruiz", "ana@example.com", "8138194188").await;
    seed_signup(&world.store, &ana, "https://conf.example/j/ana").await;

    let job_id = seed_job(
        &world.store,
        "sms_send",
        "event_signups",
        "confirmed = true",
        Some(&template_id),
        Utc::now(),
        json!({}),
    )
    .await;

    world.engine.tick().await;
    assert!(!job_record(&world, &job_id).await.get_bool("done"));
    assert!(world.openphone.messages().is_empty());
}

#[tokio::test]
async fn admin_start_meeting_emails_start_links() {
    let mut world = world().await;
    let ct = CancellationToken::new();
    let zoom_queue = world.zoom_queue.take().unwrap();
    let worker = spawn_pool_worker(zoom_queue, world.ctx.zoom_pool.clone(), ct.clone());

    let template_id = seed_template(
        &world.store,
        "Your start link",
        "<p>Start: {{params.start_url}} at {{params.start_time_est}}</p>",
    )
    .await;

    let job_id = seed_job(
        &world.store,
        "admin_start_meeting",
        "",
        "",
        Some(&template_id),
        Utc::now(),
        json!({
            "meeting_id": 777,
            "occurrence_id": 888,
            "emails": [
                {"email": "host@example.com", "first_name": "Hana", "last_name": "Lee"}
            ],
            "cc": [{"name": "Ops", "email": "ops@example.com"}]
        }),
    )
    .await;

    world.engine.tick().await;
    // The handler only enqueues; the job record flips done immediately.
    assert!(job_record(&world, &job_id).await.get_bool("done"));

    let brevo = &world.brevo;
    assert!(
        wait_until(Duration::from_secs(5), || brevo.requests().len() == 1).await,
        "start-link email should be sent by the pool"
    );

    let requests = world.brevo.requests();
    let versions = requests[0]["messageVersions"].as_array().unwrap();
    assert_eq!(versions.len(), 1);
    let params = &versions[0]["params"];
    assert_eq!(params["start_url"], json!("https://conf.example/s/host-start"));
    assert_eq!(params["topic"], json!("Board Planning"));
    assert_eq!(params["duration"], json!(60));
    assert!(params["start_time_est"].as_str().unwrap().ends_with("EDT"));
    assert!(params["link_expires_at"].is_string());
    assert_eq!(versions[0]["cc"][0]["email"], json!("ops@example.com"));
    assert_eq!(requests[0]["subject"], json!("Your start link"));

    ct.cancel();
    let _ = worker.await;
}

#[tokio::test]
async fn admin_start_webinar_uses_webinar_descriptor() {
    let mut world = world().await;
    let ct = CancellationToken::new();
    let zoom_queue = world.zoom_queue.take().unwrap();
    let worker = spawn_pool_worker(zoom_queue, world.ctx.zoom_pool.clone(), ct.clone());

    let template_id = seed_template(&world.store, "Webinar link", "<p>{{params.start_url}}</p>").await;
    let job_id = seed_job(
        &world.store,
        "admin_start_webinar",
        "",
        "",
        Some(&template_id),
        Utc::now(),
        json!({
            "webinar_id": 4242,
            "emails": [{"email": "host@example.com", "first_name": "Hana", "last_name": "Lee"}]
        }),
    )
    .await;

    world.engine.tick().await;
    assert!(job_record(&world, &job_id).await.get_bool("done"));

    let brevo = &world.brevo;
    assert!(wait_until(Duration::from_secs(5), || brevo.requests().len() == 1).await);

    ct.cancel();
    let _ = worker.await;
}
