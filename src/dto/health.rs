use serde::Serialize;
use utoipa::ToSchema;

/// Health payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Backend currently serving queue data.
    pub storage: String,
}

impl HealthResponse {
    /// Healthy response for `storage`.
    pub fn ok(storage: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            storage: storage.into(),
        }
    }

    /// Degraded response for `storage`.
    pub fn degraded(storage: impl Into<String>) -> Self {
        Self {
            status: "degraded".to_string(),
            storage: storage.into(),
        }
    }

    /// Whether the status is `ok`.
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}
