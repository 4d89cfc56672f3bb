use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::{AppError, ErrorResponse};
use crate::routes::ApiJson;
use crate::services::hub::{HubEvent, StationHub};
use crate::services::location::Location;

/// Body for PUT /api/v1/location.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LocationReport {
    pub latitude: f64,
    pub longitude: f64,
    /// When the fix was taken; defaults to the time of the request
    pub recorded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LocationUpdateResponse {
    pub location: Location,
    pub event: HubEvent,
}

/// Get the last reported location.
#[utoipa::path(
    get,
    path = "/api/v1/location",
    tag = "Location",
    responses(
        (status = 200, description = "Last known location", body = Location),
        (status = 404, description = "No location reported yet", body = ErrorResponse),
    )
)]
pub async fn get_location(State(hub): State<Arc<StationHub>>) -> Result<Json<Location>, AppError> {
    hub.locations()
        .last_location()
        .map(Json)
        .ok_or_else(|| AppError::NotFound("No location has been reported".to_string()))
}

/// Report a new location.
#[utoipa::path(
    put,
    path = "/api/v1/location",
    tag = "Location",
    request_body = LocationReport,
    responses(
        (status = 200, description = "Location stored", body = LocationUpdateResponse),
        (status = 400, description = "Coordinates are not finite", body = ErrorResponse),
    )
)]
pub async fn put_location(
    State(hub): State<Arc<StationHub>>,
    ApiJson(report): ApiJson<LocationReport>,
) -> Result<Json<LocationUpdateResponse>, AppError> {
    let location = Location {
        latitude: report.latitude,
        longitude: report.longitude,
        recorded_at: report.recorded_at.unwrap_or_else(Utc::now),
    };
    let event = hub.set_location(&location).await?;
    Ok(Json(LocationUpdateResponse { location, event }))
}
