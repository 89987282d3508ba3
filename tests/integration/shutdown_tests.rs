//! Shutdown drain behaviour for worker pools.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use member_relay::pool::{channel, spawn_pool_worker, PoolConfig};
use member_relay::sms::{OpenPhoneClient, SmsJob};

use super::test_helpers::{execution_log, sms_config, OpenPhoneStandIn, TestJob};

#[tokio::test]
async fn cancelled_sms_pool_drains_queued_messages() {
    let standin = OpenPhoneStandIn::start().await;
    let client = Arc::new(OpenPhoneClient::new(&sms_config(&standin.base_url())));

    // Rate 1/s so the queue is still full when cancellation fires.
    let (handle, queue) = channel::<SmsJob>(PoolConfig::new("openphone", 1.0, 500));
    let ct = CancellationToken::new();
    let worker = spawn_pool_worker(queue, handle.clone(), ct.clone());

    for n in 0..50 {
        handle
            .enqueue(SmsJob::Send {
                client: Arc::clone(&client),
                to_number: "8138194188".into(),
                from_number: "+15550001111".into(),
                content: format!("message {n}"),
            })
            .expect("enqueue");
    }

    // Let the worker pick up the first job, then shut down.
    tokio::time::sleep(Duration::from_millis(200)).await;
    ct.cancel();

    let started = Instant::now();
    tokio::time::timeout(Duration::from_secs(8), worker)
        .await
        .expect("worker exits within the drain budget")
        .expect("worker does not panic");
    let drained_in = started.elapsed();

    // Every queued message either completed or was dropped at the
    // rate-limit wait; nothing lingers past the drain.
    let delivered = standin.messages().len();
    assert!(
        (49..=50).contains(&delivered),
        "expected 49-50 deliveries, saw {delivered}"
    );
    assert!(
        drained_in < Duration::from_secs(6),
        "drain took {drained_in:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn slow_jobs_are_abandoned_at_the_drain_budget() {
    let mut config = PoolConfig::new("test", 100.0, 100);
    config.drain_timeout = Duration::from_millis(200);
    let (handle, queue) = channel::<TestJob>(config);
    let ct = CancellationToken::new();

    let log = execution_log();
    for label in 0..3 {
        handle
            .enqueue(TestJob::slow(label, &log, Duration::from_secs(60)))
            .expect("enqueue");
    }

    // Cancel before the worker starts so everything goes through drain.
    ct.cancel();
    let worker = spawn_pool_worker(queue, handle.clone(), ct.clone());

    tokio::time::timeout(Duration::from_secs(5), worker)
        .await
        .expect("worker exits despite slow jobs")
        .expect("worker does not panic");

    // Each job was started once and then abandoned at the budget.
    assert_eq!(log.lock().unwrap().len(), 3);
}
