//! Integration tests for the batched status aggregator.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use member_relay::pool::{channel, PoolConfig, PoolQueue};
use member_relay::zoom::{
    spawn_status_aggregator, EventType, StatusEvent, ZoomClient, ZoomJob, BATCH_SIZE,
};

use super::test_helpers::zoom_config;

fn event(event_id: &str, event_type: EventType, n: usize) -> StatusEvent {
    StatusEvent {
        event_id: event_id.to_owned(),
        event_type,
        registrant_id: format!("reg-{n}"),
        email: format!("member{n}@example.com"),
    }
}

/// Unwrap a queued job into (event id, event type, registrant ids).
fn batch_of(job: &ZoomJob) -> (String, EventType, Vec<String>) {
    match job {
        ZoomJob::UpdateRegistrantStatus {
            event_id,
            event_type,
            registrants,
            ..
        } => (
            event_id.clone(),
            *event_type,
            registrants.iter().map(|r| r.id.clone()).collect(),
        ),
        _ => panic!("expected an UpdateRegistrantStatus job"),
    }
}

struct Harness {
    tx: mpsc::Sender<StatusEvent>,
    queue: PoolQueue<ZoomJob>,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

fn start_aggregator(flush_interval: Duration) -> Harness {
    // The client is never exercised: jobs are inspected, not executed.
    let client = Arc::new(ZoomClient::new(&zoom_config("http://127.0.0.1:9")));
    let (handle, queue) = channel::<ZoomJob>(PoolConfig::new("zoom", 20.0, 10_000));
    let (tx, rx) = mpsc::channel(1_024);
    let cancel = CancellationToken::new();
    let task = spawn_status_aggregator(rx, client, handle, flush_interval, cancel.clone());
    Harness {
        tx,
        queue,
        cancel,
        task,
    }
}

#[tokio::test]
async fn batches_of_thirty_flush_on_size() {
    let mut harness = start_aggregator(Duration::from_secs(60));

    for n in 1..=120 {
        harness
            .tx
            .send(event("meet-1", EventType::Meeting, n))
            .await
            .expect("send");
    }

    let mut batches = Vec::new();
    for _ in 0..4 {
        let job = tokio::time::timeout(Duration::from_secs(2), harness.queue.recv())
            .await
            .expect("size-triggered flush")
            .expect("queue open");
        batches.push(batch_of(&job));
    }

    for (i, (event_id, event_type, ids)) in batches.iter().enumerate() {
        assert_eq!(event_id, "meet-1");
        assert_eq!(*event_type, EventType::Meeting);
        assert_eq!(ids.len(), BATCH_SIZE);
        // Arrival order is preserved within the key.
        let expected: Vec<String> = (i * 30 + 1..=i * 30 + 30)
            .map(|n| format!("reg-{n}"))
            .collect();
        assert_eq!(*ids, expected);
    }

    // Nothing is left over for the timer to flush.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(harness.queue.try_recv().is_none());

    harness.cancel.cancel();
    let _ = harness.task.await;
}

#[tokio::test(start_paused = true)]
async fn partial_batch_flushes_on_timer_once() {
    let mut harness = start_aggregator(Duration::from_secs(2));

    for n in 1..=5 {
        harness
            .tx
            .send(event("meet-1", EventType::Meeting, n))
            .await
            .expect("send");
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    // Cross the 2-second flush boundary.
    tokio::time::sleep(Duration::from_millis(1_700)).await;
    let job = tokio::time::timeout(Duration::from_secs(1), harness.queue.recv())
        .await
        .expect("timer flush")
        .expect("queue open");
    let (_, _, ids) = batch_of(&job);
    assert_eq!(ids.len(), 5);

    // No second flush fires for the now-empty batch map.
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(harness.queue.try_recv().is_none());

    harness.cancel.cancel();
    let _ = harness.task.await;
}

#[tokio::test]
async fn distinct_keys_batch_separately() {
    let mut harness = start_aggregator(Duration::from_millis(200));

    for n in 1..=3 {
        harness
            .tx
            .send(event("ev-1", EventType::Meeting, n))
            .await
            .expect("send");
    }
    for n in 11..=12 {
        harness
            .tx
            .send(event("ev-1", EventType::Webinar, n))
            .await
            .expect("send");
    }

    let mut seen = Vec::new();
    for _ in 0..2 {
        let job = tokio::time::timeout(Duration::from_secs(2), harness.queue.recv())
            .await
            .expect("timer flush")
            .expect("queue open");
        seen.push(batch_of(&job));
    }
    seen.sort_by_key(|(_, event_type, _)| event_type.as_str());

    assert_eq!(seen[0].1, EventType::Meeting);
    assert_eq!(seen[0].2.len(), 3);
    assert_eq!(seen[1].1, EventType::Webinar);
    assert_eq!(seen[1].2.len(), 2);

    harness.cancel.cancel();
    let _ = harness.task.await;
}

#[tokio::test]
async fn cancellation_flushes_remaining_batches() {
    let mut harness = start_aggregator(Duration::from_secs(60));

    for n in 1..=7 {
        harness
            .tx
            .send(event("meet-9", EventType::Meeting, n))
            .await
            .expect("send");
    }
    // Let the aggregator absorb the events before cancelling.
    tokio::time::sleep(Duration::from_millis(100)).await;
    harness.cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), harness.task)
        .await
        .expect("aggregator exits")
        .expect("no panic");

    let job = harness.queue.try_recv().expect("cancel-time flush");
    let (_, _, ids) = batch_of(&job);
    assert_eq!(ids.len(), 7);
}

#[tokio::test]
async fn every_event_lands_in_exactly_one_batch() {
    let mut harness = start_aggregator(Duration::from_millis(300));

    // 75 events interleaved across two keys, so one key crosses the size
    // trigger while the other drains on the timer and at cancellation.
    let mut sent = Vec::new();
    for n in 1..=75 {
        let (key, event_type) = if n % 2 == 0 {
            ("ev-a", EventType::Meeting)
        } else {
            ("ev-b", EventType::Webinar)
        };
        harness
            .tx
            .send(event(key, event_type, n))
            .await
            .expect("send");
        sent.push(format!("reg-{n}"));
    }

    tokio::time::sleep(Duration::from_millis(600)).await;
    harness.cancel.cancel();
    let _ = harness.task.await;

    let mut flushed = Vec::new();
    while let Some(job) = harness.queue.try_recv() {
        let (_, _, mut ids) = batch_of(&job);
        flushed.append(&mut ids);
    }

    let mut sent_sorted = sent.clone();
    sent_sorted.sort();
    let mut flushed_sorted = flushed.clone();
    flushed_sorted.sort();
    assert_eq!(flushed.len(), 75, "no event may be dropped or duplicated");
    assert_eq!(sent_sorted, flushed_sorted);
}
