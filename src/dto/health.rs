use serde::Serialize;
use utoipa::ToSchema;

/// Health payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Whether the last storage ping succeeded.
    pub storage_reachable: bool,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            storage_reachable: true,
        }
    }

    /// No store is installed, or the installed one failed its ping.
    pub fn degraded(storage_reachable: bool) -> Self {
        Self {
            status: "degraded".to_string(),
            storage_reachable,
        }
    }
}
