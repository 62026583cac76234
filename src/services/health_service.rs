use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Ping the installed store and report whether the service is degraded.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let Some(store) = state.queue_store().await else {
        warn!("no queue store installed (degraded mode)");
        return HealthResponse::degraded("none");
    };

    if let Err(err) = store.health_check().await {
        warn!(error = %err, "storage health check failed");
        return HealthResponse::degraded(store.backend());
    }

    if state.is_degraded() {
        HealthResponse::degraded(store.backend())
    } else {
        HealthResponse::ok(store.backend())
    }
}
