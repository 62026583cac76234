//! Background task that owns the database connection lifecycle and toggles
//! degraded mode while storage is unreachable.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{queue_store::QueueStore, storage::StorageError},
    services::sse_events,
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect with exponential backoff, install the store, then watch its health.
/// Runs until the process exits.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn QueueStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.set_queue_store(store.clone()).await;
                sse_events::broadcast_system_status(&state, false);
                info!(backend = store.backend(), "storage connection established; leaving degraded mode");
                delay = INITIAL_DELAY;

                watch_health(&state, store.as_ref()).await;
                warn!("exhausted storage reconnect attempts; staying in degraded mode");
            }
            Err(err) => warn!(error = %err, "storage connection attempt failed"),
        }

        sleep(delay).await;
        delay = (delay * 2).min(MAX_DELAY);
    }
}

/// Poll the store until it fails and cannot be revived.
async fn watch_health(state: &SharedState, store: &dyn QueueStore) {
    loop {
        match store.health_check().await {
            Ok(()) => {
                set_degraded(state, false);
                sleep(HEALTH_POLL_INTERVAL).await;
            }
            Err(err) => {
                warn!(error = %err, "storage health check failed; entering degraded mode");
                set_degraded(state, true);
                if !reconnect(store).await {
                    return;
                }
                info!("storage reconnection succeeded after health check failure");
                set_degraded(state, false);
                sleep(HEALTH_POLL_INTERVAL).await;
            }
        }
    }
}

async fn reconnect(store: &dyn QueueStore) -> bool {
    let mut reconnect_delay = INITIAL_DELAY;
    for attempt in 1..=MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => return true,
            Err(err) => {
                warn!(attempt, error = %err, "storage reconnect attempt failed");
                sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
            }
        }
    }
    false
}

fn set_degraded(state: &SharedState, degraded: bool) {
    if state.update_degraded(degraded) {
        sse_events::broadcast_system_status(state, degraded);
    }
}
