use std::sync::Arc;

use axum::extract::FromRequest;
use axum::routing::{get, post};
use axum::Router;

use crate::errors::AppError;
use crate::services::hub::StationHub;
use crate::services::poller::SharedPollerState;

pub mod action;
pub mod health;
pub mod location;
pub mod poller;
pub mod settings;
pub mod stations;

/// JSON body extractor whose rejections come back as `ErrorResponse`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// All `/api/v1` routes.
///
/// Hub routes use the hub as state directly; the status route only needs the
/// poller state.
pub fn router(hub: Arc<StationHub>, poller_state: SharedPollerState) -> Router {
    let hub_routes = Router::new()
        .route("/api/v1/health", get(health::health_check))
        .route("/api/v1/stations", get(stations::list_stations))
        .route("/api/v1/stations/closest", get(stations::get_closest_station))
        .route("/api/v1/stations/refresh", post(stations::refresh_stations))
        .route(
            "/api/v1/action",
            get(action::get_action).put(action::put_action),
        )
        .route(
            "/api/v1/location",
            get(location::get_location).put(location::put_location),
        )
        .route(
            "/api/v1/settings",
            get(settings::get_settings).put(settings::put_settings),
        )
        .route(
            "/api/v1/settings/disclaimer",
            post(settings::agree_disclaimer),
        )
        .with_state(hub);

    let poller_routes = Router::new()
        .route("/api/v1/poller/status", get(poller::get_poller_status))
        .with_state(poller_state);

    Router::new().merge(hub_routes).merge(poller_routes)
}
