use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::{AppError, ErrorResponse};
use crate::routes::ApiJson;
use crate::services::action::Destination;
use crate::services::geo::Coordinate;
use crate::services::hub::StationHub;
use crate::services::settings::{Settings, SettingsUpdate, DISCLAIMER_VERSION};

#[derive(Debug, Serialize, ToSchema)]
pub struct DestinationResponse {
    pub active: bool,
    /// Stored coordinate; kept while inactive
    pub coordinate: Option<Coordinate>,
}

/// Response for GET/PUT /api/v1/settings.
#[derive(Debug, Serialize, ToSchema)]
pub struct SettingsResponse {
    pub vibration_enabled: bool,
    pub empty_threshold: i32,
    pub full_threshold: i32,
    pub home: DestinationResponse,
    pub work: DestinationResponse,
    pub disclaimer_agreed: bool,
    pub agreed_disclaimer_version: Option<i64>,
    /// Version that must be agreed to before notices are shown
    pub current_disclaimer_version: i64,
}

impl From<&Settings> for SettingsResponse {
    fn from(s: &Settings) -> Self {
        let destination = |d: Destination| DestinationResponse {
            active: s.is_destination_active(d),
            coordinate: s.destination(d),
        };
        Self {
            vibration_enabled: s.vibration_enabled(),
            empty_threshold: s.empty_threshold(),
            full_threshold: s.full_threshold(),
            home: destination(Destination::Home),
            work: destination(Destination::Work),
            disclaimer_agreed: s.is_disclaimer_agreed(),
            agreed_disclaimer_version: s.agreed_disclaimer_version(),
            current_disclaimer_version: DISCLAIMER_VERSION,
        }
    }
}

/// Body for POST /api/v1/settings/disclaimer.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct DisclaimerAgreement {
    /// Version being agreed to; defaults to the current one
    pub version: Option<i64>,
}

/// Get all settings.
#[utoipa::path(
    get,
    path = "/api/v1/settings",
    tag = "Settings",
    responses(
        (status = 200, description = "Current settings", body = SettingsResponse),
    )
)]
pub async fn get_settings(State(hub): State<Arc<StationHub>>) -> Json<SettingsResponse> {
    Json(SettingsResponse::from(hub.settings()))
}

/// Update some settings. Fields left out are unchanged.
#[utoipa::path(
    put,
    path = "/api/v1/settings",
    tag = "Settings",
    request_body = SettingsUpdate,
    responses(
        (status = 200, description = "Settings stored", body = SettingsResponse),
        (status = 400, description = "Negative threshold", body = ErrorResponse),
    )
)]
pub async fn put_settings(
    State(hub): State<Arc<StationHub>>,
    ApiJson(update): ApiJson<SettingsUpdate>,
) -> Result<Json<SettingsResponse>, AppError> {
    hub.update_settings(&update).await?;
    Ok(Json(SettingsResponse::from(hub.settings())))
}

/// Record agreement to the disclaimer. Notices are only shown once the
/// current version has been agreed to.
#[utoipa::path(
    post,
    path = "/api/v1/settings/disclaimer",
    tag = "Settings",
    request_body = DisclaimerAgreement,
    responses(
        (status = 200, description = "Agreement stored", body = SettingsResponse),
    )
)]
pub async fn agree_disclaimer(
    State(hub): State<Arc<StationHub>>,
    ApiJson(agreement): ApiJson<DisclaimerAgreement>,
) -> Result<Json<SettingsResponse>, AppError> {
    let version = agreement.version.unwrap_or(DISCLAIMER_VERSION);
    hub.agree_disclaimer(version).await?;
    tracing::info!("Disclaimer version {} agreed", version);
    Ok(Json(SettingsResponse::from(hub.settings())))
}
