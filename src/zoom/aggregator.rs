//! Batched status aggregator.
//!
//! Coalesces per-registrant approval events keyed by (event id, event type)
//! into batches flushed by size or timer, so the provider's batch endpoint
//! absorbs registrations without serializing the limiter behind one call
//! per attendee.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pool::PoolHandle;
use crate::zoom::api::ZoomClient;
use crate::zoom::jobs::ZoomJob;
use crate::zoom::models::{EventType, RegistrantStatus};

/// Size at which a key's batch is flushed immediately.
pub const BATCH_SIZE: usize = 30;

/// One registrant approval to be folded into a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub event_id: String,
    pub event_type: EventType,
    pub registrant_id: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BatchKey {
    event_id: String,
    event_type: EventType,
}

/// Spawn the aggregator task.
///
/// Events sharing a key flush in arrival order. A key's batch flushes as
/// soon as it reaches [`BATCH_SIZE`] (exactly that many; the tail stays),
/// and every non-empty batch flushes on each `flush_interval` tick. On
/// cancellation all remaining batches are flushed before exit.
#[must_use]
pub fn spawn_status_aggregator(
    mut rx: mpsc::Receiver<StatusEvent>,
    client: Arc<ZoomClient>,
    pool: PoolHandle<ZoomJob>,
    flush_interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut batches: HashMap<BatchKey, Vec<RegistrantStatus>> = HashMap::new();
        let mut tick = tokio::time::interval(flush_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first interval tick fires immediately; swallow it so the
        // timer measures from startup.
        tick.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    for (key, registrants) in batches.drain() {
                        if !registrants.is_empty() {
                            flush(&key, registrants, &client, &pool);
                        }
                    }
                    info!("status aggregator shut down");
                    return;
                }
                maybe_event = rx.recv() => {
                    let Some(event) = maybe_event else {
                        for (key, registrants) in batches.drain() {
                            if !registrants.is_empty() {
                                flush(&key, registrants, &client, &pool);
                            }
                        }
                        info!("status channel closed; aggregator exiting");
                        return;
                    };
                    let key = BatchKey {
                        event_id: event.event_id,
                        event_type: event.event_type,
                    };
                    let batch = batches.entry(key.clone()).or_default();
                    batch.push(RegistrantStatus {
                        id: event.registrant_id,
                        email: event.email,
                    });
                    if batch.len() >= BATCH_SIZE {
                        let ready: Vec<RegistrantStatus> = batch.drain(..BATCH_SIZE).collect();
                        flush(&key, ready, &client, &pool);
                    }
                }
                _ = tick.tick() => {
                    for (key, registrants) in batches.drain() {
                        if !registrants.is_empty() {
                            flush(&key, registrants, &client, &pool);
                        }
                    }
                }
            }
        }
    })
}

/// Queue one batched status-update job; the pool worker and limiter handle
/// rate control from here.
fn flush(
    key: &BatchKey,
    registrants: Vec<RegistrantStatus>,
    client: &Arc<ZoomClient>,
    pool: &PoolHandle<ZoomJob>,
) {
    debug!(
        event_id = %key.event_id,
        event_type = key.event_type.as_str(),
        count = registrants.len(),
        "flushing status batch"
    );
    let job = ZoomJob::UpdateRegistrantStatus {
        client: Arc::clone(client),
        event_type: key.event_type,
        event_id: key.event_id.clone(),
        registrants,
    };
    if let Err(err) = pool.enqueue(job) {
        warn!(%err, "failed to enqueue status batch");
    }
}
