//! Periodic reconciliation of open queues against the clock.
//!
//! Requests reconcile the queue they touch, so the sweep only matters for
//! queues nobody is looking at: it opens them at their start, hands an empty
//! current slot to the next waiting participant, and closes them at their end
//! so turn notices go out on time.

use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::{
    dao::models::QueueScope,
    error::ServiceError,
    services::queue_service,
    state::{SharedState, lifecycle, queue::Queue},
};

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Queues with a due lifecycle event or a slot that may need refilling.
    pub examined: usize,
    /// Queues whose state actually changed.
    pub transitioned: usize,
    /// Queues skipped because a request held their lock.
    pub skipped_busy: usize,
}

/// Sweep every `period` until the process exits. Spawn it on the runtime.
pub async fn run(state: SharedState, period: Duration) {
    info!(interval_secs = period.as_secs(), "queue sweeper started");

    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tick.tick().await;

        match sweep_once(&state).await {
            Ok(report) if report.transitioned > 0 || report.skipped_busy > 0 => info!(
                examined = report.examined,
                transitioned = report.transitioned,
                skipped_busy = report.skipped_busy,
                "queue sweep completed"
            ),
            Ok(_) => {}
            Err(ServiceError::Degraded) => debug!("queue sweep skipped (degraded mode)"),
            Err(err) => warn!(error = %err, "queue sweep failed"),
        }
    }
}

/// Reconcile every open queue whose state may change now.
///
/// Busy queues are left alone; whoever holds the lock reconciles them, and the
/// next sweep catches anything left over.
pub async fn sweep_once(state: &SharedState) -> Result<SweepReport, ServiceError> {
    let store = state.require_queue_store().await?;
    let now = state.now();
    let mut report = SweepReport::default();

    for entity in store.list_queues(QueueScope::Open).await? {
        let queue = Queue::from(entity);
        if !lifecycle::may_change(&queue, now) {
            continue;
        }
        report.examined += 1;

        match queue_service::try_reconcile(state, &store, queue.id).await {
            None => report.skipped_busy += 1,
            Some(Ok(true)) => report.transitioned += 1,
            Some(Ok(false)) | Some(Err(ServiceError::NotFound(_))) => {}
            Some(Err(err)) => {
                warn!(queue_id = %queue.id, error = %err, "failed to reconcile queue");
            }
        }
    }

    Ok(report)
}
