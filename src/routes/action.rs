use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::errors::{AppError, ErrorResponse};
use crate::routes::ApiJson;
use crate::services::action::{Action, ActionState};
use crate::services::hub::{HubEvent, StationHub};

/// The current action and the refresh cadence it implies.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    pub action: Action,
    /// Stored destination name, if any
    pub destination: Option<String>,
    /// e.g. "Riding to Home"
    pub display_name: String,
    /// Seconds between station feed syncs
    pub sync_period_secs: u64,
    /// Seconds between location reports the service would like to receive
    pub location_interval_secs: u64,
    /// Never report locations more often than this
    pub fastest_location_interval_secs: u64,
    /// Whether reporters should use a high-accuracy location source
    pub high_accuracy: bool,
}

impl From<ActionState> for ActionResponse {
    fn from(state: ActionState) -> Self {
        let cadence = state.action.cadence();
        Self {
            action: state.action,
            display_name: state.display_name(),
            destination: state.destination,
            sync_period_secs: cadence.sync_period.as_secs(),
            location_interval_secs: cadence.location_interval.as_secs(),
            fastest_location_interval_secs: cadence.fastest_location_interval.as_secs(),
            high_accuracy: cadence.high_accuracy,
        }
    }
}

/// Response for PUT /api/v1/action.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionChangeResponse {
    /// False when the requested action was already in effect
    pub changed: bool,
    pub current: ActionResponse,
    /// The update triggered by the change, if any
    pub event: Option<HubEvent>,
}

/// Get the current action.
#[utoipa::path(
    get,
    path = "/api/v1/action",
    tag = "Action",
    responses(
        (status = 200, description = "Current action", body = ActionResponse),
    )
)]
pub async fn get_action(State(hub): State<Arc<StationHub>>) -> Json<ActionResponse> {
    Json(ActionResponse::from(hub.actions().current()))
}

/// Set the current action and optional destination.
///
/// Setting the action already in effect changes nothing and triggers no update.
#[utoipa::path(
    put,
    path = "/api/v1/action",
    tag = "Action",
    request_body = ActionState,
    responses(
        (status = 200, description = "Action stored", body = ActionChangeResponse),
        (status = 500, description = "Preference store write failed", body = ErrorResponse),
    )
)]
pub async fn put_action(
    State(hub): State<Arc<StationHub>>,
    ApiJson(state): ApiJson<ActionState>,
) -> Result<Json<ActionChangeResponse>, AppError> {
    let event = hub.set_action(&state).await?;
    Ok(Json(ActionChangeResponse {
        changed: event.is_some(),
        current: ActionResponse::from(hub.actions().current()),
        event,
    }))
}
