//! End-to-end registration fan-out against the provider stand-in.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use member_relay::pool::{channel, spawn_pool_worker, PoolConfig};
use member_relay::store::RecordStore;
use member_relay::zoom::registration::register_members;
use member_relay::zoom::{spawn_status_aggregator, ZoomClient, ZoomJob};

use super::test_helpers::{mem_store, seed_member, wait_until, zoom_config, ZoomStandIn};

struct Rig {
    store: RecordStore,
    standin: ZoomStandIn,
    client: Arc<ZoomClient>,
    pool: member_relay::pool::PoolHandle<ZoomJob>,
    status_tx: mpsc::Sender<member_relay::zoom::StatusEvent>,
    cancel: CancellationToken,
    worker: tokio::task::JoinHandle<()>,
    aggregator: tokio::task::JoinHandle<()>,
}

/// Store, stand-in, a live Zoom pool at `rate`, and a live aggregator.
async fn rig(rate: f64) -> Rig {
    let store = mem_store().await;
    let standin = ZoomStandIn::start().await;
    let client = Arc::new(ZoomClient::new(&zoom_config(&standin.base_url())));

    let (pool, queue) = channel::<ZoomJob>(
        PoolConfig::new("zoom", rate, 10_000).rate_limit_backoff(Duration::from_secs(1)),
    );
    let cancel = CancellationToken::new();
    let worker = spawn_pool_worker(queue, pool.clone(), cancel.clone());

    let (status_tx, status_rx) = mpsc::channel(10_000);
    let aggregator = spawn_status_aggregator(
        status_rx,
        Arc::clone(&client),
        pool.clone(),
        Duration::from_secs(2),
        cancel.clone(),
    );

    Rig {
        store,
        standin,
        client,
        pool,
        status_tx,
        cancel,
        worker,
        aggregator,
    }
}

async fn member_zoom_rows(store: &RecordStore) -> Vec<member_relay::store::Record> {
    store
        .find_by_filter("member_zoom", "", "", 0, 0)
        .await
        .expect("member_zoom rows")
}

#[tokio::test]
async fn registration_fan_out_registers_everyone_and_batches_status() {
    let rig = rig(20.0).await;
    for n in 0..120 {
        seed_member(
            &rig.store,
            "Member",
            &format!("Num{n}"),
            &format!("member{n}@example.com"),
            "8138194188",
        )
        .await;
    }

    let started = Instant::now();
    let outcome = register_members(
        &rig.store,
        &rig.client,
        &rig.pool,
        &rig.status_tx,
        &zoom_config(&rig.standin.base_url()),
        &rig.cancel,
    )
    .await
    .expect("sweep succeeds");
    let elapsed = started.elapsed();

    assert_eq!(outcome.registered, 120);
    assert_eq!(outcome.failed, 0);
    assert!(
        elapsed <= Duration::from_secs(7),
        "sweep took {elapsed:?} at 20 req/s"
    );

    // Every registration targeted the configured occurrence.
    let registrations = rig.standin.registrations();
    assert_eq!(registrations.len(), 120);
    assert!(registrations
        .iter()
        .all(|call| call.occurrence_id.as_deref() == Some("occ-1")));

    // One member_zoom row per member, carrying the personal join URL.
    let rows = member_zoom_rows(&rig.store).await;
    assert_eq!(rows.len(), 120);
    assert!(rows
        .iter()
        .all(|row| row.get_string("join_url").starts_with("https://conf.example/j/")));
    assert!(rows.iter().all(|row| !row.get_string("member").is_empty()));

    // 120 status events coalesce into exactly four batches of thirty.
    let standin = &rig.standin;
    assert!(
        wait_until(Duration::from_secs(10), || standin.status_batches().len() == 4).await,
        "expected four status batches, saw {}",
        rig.standin.status_batches().len()
    );
    let batches = rig.standin.status_batches();
    assert!(batches.iter().all(|batch| batch.registrants.len() == 30));
    assert!(batches.iter().all(|batch| batch.action == "approve"));

    rig.cancel.cancel();
    let _ = rig.worker.await;
    let _ = rig.aggregator.await;
}

#[tokio::test]
async fn rate_limited_registration_retries_and_creates_one_row() {
    let rig = rig(20.0).await;
    for n in 0..12 {
        seed_member(
            &rig.store,
            "Member",
            &format!("Num{n}"),
            &format!("member{n}@example.com"),
            "8138194188",
        )
        .await;
    }
    // The tenth registration call hits the per-second cap once.
    rig.standin.reject_registration_call(10);

    let started = Instant::now();
    let outcome = register_members(
        &rig.store,
        &rig.client,
        &rig.pool,
        &rig.status_tx,
        &zoom_config(&rig.standin.base_url()),
        &rig.cancel,
    )
    .await
    .expect("sweep succeeds");
    let elapsed = started.elapsed();

    // The affected member is retried, not reported failed.
    assert_eq!(outcome.registered, 12);
    assert_eq!(outcome.failed, 0);
    assert_eq!(rig.standin.registration_calls(), 13, "one retry expected");
    assert!(
        elapsed >= Duration::from_secs(1),
        "elapsed {elapsed:?} should include the 1s backoff"
    );

    // Exactly one row per member, none duplicated by the retry.
    let rows = member_zoom_rows(&rig.store).await;
    assert_eq!(rows.len(), 12);
    let mut members: Vec<String> = rows.iter().map(|row| row.get_string("member")).collect();
    members.sort();
    members.dedup();
    assert_eq!(members.len(), 12);

    rig.cancel.cancel();
    let _ = rig.worker.await;
    let _ = rig.aggregator.await;
}
