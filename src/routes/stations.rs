use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::errors::{AppError, ErrorResponse};
use crate::services::action::ActionState;
use crate::services::geo::CompassPoint;
use crate::services::hub::StationHub;
use crate::services::notice::StationNotice;
use crate::services::ranking::{order_closest_stations, RankingStrategy, StationDistance};
use crate::services::selector::{closest_available, RankedStationDistance};
use crate::store::models::{Station, StationSnapshot};

#[derive(Debug, Deserialize, IntoParams)]
pub struct StationListQuery {
    /// Return at most this many stations (default: all)
    pub limit: Option<usize>,
}

/// How the list was ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RankingMode {
    /// Distance from the current location
    Location,
    /// Weighted towards the riding destination
    Destination,
    /// No location is known; the list is empty
    Unranked,
}

impl From<Option<RankingStrategy>> for RankingMode {
    fn from(strategy: Option<RankingStrategy>) -> Self {
        match strategy {
            Some(RankingStrategy::ByLocation { .. }) => RankingMode::Location,
            Some(RankingStrategy::ByDestination { .. }) => RankingMode::Destination,
            None => RankingMode::Unranked,
        }
    }
}

/// A station with its distance from the user.
#[derive(Debug, Serialize, ToSchema)]
pub struct StationDistanceResponse {
    pub station: Station,
    pub miles_to_location: f64,
    pub kilometers_to_location: f64,
    pub meters_to_location: f64,
    /// Direction of travel from the current location
    pub direction: CompassPoint,
    /// Human-readable distance, e.g. "420 Feet NE"
    pub distance_label: String,
    /// Only set when ranked towards a destination
    #[serde(skip_serializing_if = "Option::is_none")]
    pub miles_to_destination: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kilometers_to_destination: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meters_to_destination: Option<f64>,
}

impl From<&StationDistance<'_>> for StationDistanceResponse {
    fn from(d: &StationDistance<'_>) -> Self {
        Self {
            station: d.station.clone(),
            miles_to_location: d.miles_to_location,
            kilometers_to_location: d.kilometers_to_location(),
            meters_to_location: d.meters_to_location(),
            direction: d.direction,
            distance_label: d.distance_label(),
            miles_to_destination: d.miles_to_destination,
            kilometers_to_destination: d.kilometers_to_destination(),
            meters_to_destination: d.meters_to_destination(),
        }
    }
}

/// Response for GET /api/v1/stations.
#[derive(Debug, Serialize, ToSchema)]
pub struct StationListResponse {
    pub action: ActionState,
    pub ranking: RankingMode,
    /// Upstream `executionTime` of the snapshot
    pub execution_time: Option<String>,
    /// When the snapshot was retrieved (ISO 8601)
    pub retrieved_at: Option<String>,
    /// Total stations in the snapshot, before any limit
    pub total: usize,
    pub stations: Vec<StationDistanceResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SelectionResponse {
    pub station: StationDistanceResponse,
    /// Zero-based position in the ranked list
    pub rank: usize,
    /// Rank capped at 3
    pub limited_rank: usize,
}

impl From<&RankedStationDistance<'_>> for SelectionResponse {
    fn from(r: &RankedStationDistance<'_>) -> Self {
        Self {
            station: StationDistanceResponse::from(&r.distance),
            rank: r.rank,
            limited_rank: r.limited_rank,
        }
    }
}

/// Response for GET /api/v1/stations/closest.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClosestStationResponse {
    pub action: ActionState,
    pub ranking: RankingMode,
    /// The closest station meeting the current threshold, if any
    pub selection: Option<SelectionResponse>,
    /// The notice as last published by the hub
    pub notice: Option<StationNotice>,
}

/// Response for POST /api/v1/stations/refresh.
#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub station_count: usize,
    pub execution_time: Option<String>,
    pub retrieved_at: Option<String>,
}

impl From<&StationSnapshot> for RefreshResponse {
    fn from(s: &StationSnapshot) -> Self {
        Self {
            station_count: s.len(),
            execution_time: s.execution_time.clone(),
            retrieved_at: s.timestamp.map(|t| t.to_rfc3339()),
        }
    }
}

async fn require_snapshot(hub: &StationHub) -> Result<Arc<StationSnapshot>, AppError> {
    hub.snapshot().await.ok_or_else(|| {
        AppError::Unavailable(
            "No station data available yet, a sync has been requested".to_string(),
        )
    })
}

/// List stations ordered for the current action and location.
///
/// Ordered by distance from the last known location, or, while riding to a
/// configured destination, by distance to the destination weighted four to
/// one against distance from the rider.
#[utoipa::path(
    get,
    path = "/api/v1/stations",
    tag = "Stations",
    params(StationListQuery),
    responses(
        (status = 200, description = "Ranked station list", body = StationListResponse),
        (status = 503, description = "No station data available", body = ErrorResponse),
    )
)]
pub async fn list_stations(
    State(hub): State<Arc<StationHub>>,
    Query(params): Query<StationListQuery>,
) -> Result<Json<StationListResponse>, AppError> {
    let snapshot = require_snapshot(&hub).await?;
    let context = hub.ranking_context();
    let ordered = order_closest_stations(snapshot.stations(), context.strategy);
    let limit = params.limit.unwrap_or(ordered.len());

    Ok(Json(StationListResponse {
        action: context.action,
        ranking: RankingMode::from(context.strategy),
        execution_time: snapshot.execution_time.clone(),
        retrieved_at: snapshot.timestamp.map(|t| t.to_rfc3339()),
        total: snapshot.len(),
        stations: ordered
            .iter()
            .take(limit)
            .map(StationDistanceResponse::from)
            .collect(),
    }))
}

/// Get the closest station that can serve the current action.
///
/// Riders need more open docks than the full threshold; everyone else needs
/// more bikes than the empty threshold.
#[utoipa::path(
    get,
    path = "/api/v1/stations/closest",
    tag = "Stations",
    responses(
        (status = 200, description = "Closest qualifying station and current notice", body = ClosestStationResponse),
        (status = 503, description = "No station data available", body = ErrorResponse),
    )
)]
pub async fn get_closest_station(
    State(hub): State<Arc<StationHub>>,
) -> Result<Json<ClosestStationResponse>, AppError> {
    let snapshot = require_snapshot(&hub).await?;
    let context = hub.ranking_context();
    let ordered = order_closest_stations(snapshot.stations(), context.strategy);
    let selection = closest_available(&ordered, context.requirement);

    Ok(Json(ClosestStationResponse {
        action: context.action,
        ranking: RankingMode::from(context.strategy),
        selection: selection.as_ref().map(SelectionResponse::from),
        notice: hub.current_notice().await,
    }))
}

/// Sync the station feed now.
#[utoipa::path(
    post,
    path = "/api/v1/stations/refresh",
    tag = "Stations",
    responses(
        (status = 200, description = "Feed synced", body = RefreshResponse),
        (status = 502, description = "Feed unreachable or malformed", body = ErrorResponse),
    )
)]
pub async fn refresh_stations(
    State(hub): State<Arc<StationHub>>,
) -> Result<Json<RefreshResponse>, AppError> {
    let snapshot = hub.refresh().await?;
    Ok(Json(RefreshResponse::from(snapshot.as_ref())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::router;
    use crate::routes::test_support::{get_json, send_json, test_app, test_hub};
    use crate::services::poller::PollerState;
    use crate::store::models::fixtures::{snapshot, station};
    use axum::http::StatusCode;
    use tokio::sync::RwLock;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn with_location(hub: &StationHub) {
        hub.set_location(&crate::services::location::Location {
            latitude: 40.7417806,
            longitude: -74.0045012,
            recorded_at: chrono::Utc::now(),
        })
        .await
        .unwrap();
    }

    fn stations() -> StationSnapshot {
        snapshot(vec![
            station(1, 40.7600, -74.0045, 5, 5),
            station(2, 40.7420, -74.0045, 0, 5),
            station(3, 40.7500, -74.0045, 5, 0),
        ])
    }

    #[tokio::test]
    async fn test_list_without_data_is_unavailable() {
        let (app, _hub, _dir) = test_app();
        let (status, body) = get_json(app, "/api/v1/stations").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().contains("sync"));
    }

    #[tokio::test]
    async fn test_list_orders_by_location() {
        let (app, hub, _dir) = test_app();
        with_location(&hub).await;
        hub.insert(stations()).await;

        let (status, body) = get_json(app, "/api/v1/stations?limit=2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ranking"], "location");
        assert_eq!(body["total"], 3);
        let ids: Vec<i64> = body["stations"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["station"]["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(body["stations"][0]["direction"], "N");
        assert!(body["stations"][0].get("miles_to_destination").is_none());
    }

    #[tokio::test]
    async fn test_list_without_location_is_empty() {
        let (app, hub, _dir) = test_app();
        hub.insert(stations()).await;

        let (status, body) = get_json(app, "/api/v1/stations").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ranking"], "unranked");
        assert_eq!(body["stations"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_closest_for_rider() {
        let (app, hub, _dir) = test_app();
        with_location(&hub).await;
        hub.insert(stations()).await;
        hub.set_action(&ActionState::riding_to("Work")).await.unwrap();

        let (status, body) = get_json(app, "/api/v1/stations/closest").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["action"]["action"], "riding");
        assert_eq!(body["selection"]["station"]["station"]["id"], 2);
        assert_eq!(body["selection"]["rank"], 0);
        // Disclaimer not agreed: nothing published.
        assert!(body["notice"].is_null());
    }

    #[tokio::test]
    async fn test_closest_skips_empty_stations() {
        let (app, hub, _dir) = test_app();
        with_location(&hub).await;
        hub.insert(stations()).await;

        let (_, body) = get_json(app, "/api/v1/stations/closest").await;
        assert_eq!(body["selection"]["station"]["station"]["id"], 3);
        assert_eq!(body["selection"]["rank"], 1);
        assert_eq!(body["selection"]["limited_rank"], 1);
    }

    #[tokio::test]
    async fn test_refresh_unreachable_feed() {
        let (app, _hub, _dir) = test_app();
        let (status, _) =
            send_json(app, "POST", "/api/v1/stations/refresh", serde_json::json!({})).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_refresh_stores_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&stations()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let hub = test_hub(&format!("{}/stations/json", server.uri()), &dir);
        let app = router(hub.clone(), Arc::new(RwLock::new(PollerState::new())));

        let (status, body) =
            send_json(app, "POST", "/api/v1/stations/refresh", serde_json::json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["station_count"], 3);
        assert!(body["retrieved_at"].is_string());
        assert_eq!(hub.cached_snapshot().await.map(|s| s.len()), Some(3));
    }
}
