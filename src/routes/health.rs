use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::services::hub::StationHub;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status ("ok" when station data is loaded, "degraded" before the first sync)
    pub status: String,
    /// API version
    pub version: String,
    /// Whether a station snapshot is held in memory
    pub station_data: bool,
    /// Whether the current disclaimer has been agreed to
    pub disclaimer_agreed: bool,
}

/// Health check endpoint.
///
/// Still returns 200 when no station data is loaded yet, so load balancers can
/// tell a cold start from a dead process.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse),
    )
)]
pub async fn health_check(State(hub): State<Arc<StationHub>>) -> Json<HealthResponse> {
    let has_data = hub.cached_snapshot().await.is_some();

    Json(HealthResponse {
        status: if has_data {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        station_data: has_data,
        disclaimer_agreed: hub.settings().is_disclaimer_agreed(),
    })
}
