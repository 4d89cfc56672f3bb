//! Poller status HTTP endpoint.
//!
//! GET /api/v1/poller/status returns the current state of the background
//! station feed poller as JSON.

use axum::extract::State;
use axum::Json;

use crate::services::poller::{PollerState, SharedPollerState};

/// Get the current poller status.
///
/// Returns when the poller will next wake, how the last sync went and what it
/// brought in.
#[utoipa::path(
    get,
    path = "/api/v1/poller/status",
    tag = "Poller",
    responses(
        (status = 200, description = "Current poller status", body = PollerState),
    )
)]
pub async fn get_poller_status(State(state): State<SharedPollerState>) -> Json<PollerState> {
    let s = state.read().await;
    Json(s.clone())
}
