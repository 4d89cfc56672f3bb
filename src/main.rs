// Rollout API v0.1
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod errors;
mod helpers;
mod routes;
mod services;
mod store;

use config::AppConfig;
use services::feed::FeedClient;
use services::hub::StationHub;
use services::poller::{PollerState, SharedPollerState};
use store::preferences::PreferenceStore;
use store::snapshot::SnapshotStore;

/// Rollout API OpenAPI document.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Rollout API",
        version = "0.1.0",
        description = "Bike-share availability service. Keeps a fresh copy of the \
            CitiBike station feed, ranks stations by distance from the rider (or \
            towards their destination) and picks the closest one that has a bike \
            or an open dock, depending on what the user is doing.",
        license(name = "Apache-2.0"),
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Stations", description = "Ranked stations and the current selection"),
        (name = "Action", description = "What the user is doing right now"),
        (name = "Location", description = "Last reported location"),
        (name = "Settings", description = "Thresholds, destinations and the disclaimer"),
        (name = "Poller", description = "Background feed poller status"),
    ),
    paths(
        routes::health::health_check,
        routes::stations::list_stations,
        routes::stations::get_closest_station,
        routes::stations::refresh_stations,
        routes::action::get_action,
        routes::action::put_action,
        routes::location::get_location,
        routes::location::put_location,
        routes::settings::get_settings,
        routes::settings::put_settings,
        routes::settings::agree_disclaimer,
        routes::poller::get_poller_status,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            routes::stations::RankingMode,
            routes::stations::StationDistanceResponse,
            routes::stations::StationListResponse,
            routes::stations::SelectionResponse,
            routes::stations::ClosestStationResponse,
            routes::stations::RefreshResponse,
            routes::action::ActionResponse,
            routes::action::ActionChangeResponse,
            routes::location::LocationReport,
            routes::location::LocationUpdateResponse,
            routes::settings::DestinationResponse,
            routes::settings::SettingsResponse,
            routes::settings::DisclaimerAgreement,
            store::models::Station,
            services::geo::Coordinate,
            services::geo::CompassPoint,
            services::action::Action,
            services::action::ActionState,
            services::location::Location,
            services::notice::StationNotice,
            services::notice::NoticePriority,
            services::hub::HubEvent,
            services::hub::NoticeUpdate,
            services::hub::UpdateReason,
            services::settings::SettingsUpdate,
            services::settings::DestinationUpdate,
            services::poller::PollerState,
            services::poller::PollResult,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rollout_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();
    tracing::info!(
        "Feed {} (timeout {:?}), data in {}",
        config.feed_url,
        config.feed_timeout,
        config.data_dir.display()
    );

    let feed = FeedClient::new(&config.feed_url, &config.feed_user_agent, config.feed_timeout)
        .expect("Failed to build feed client");
    let prefs = Arc::new(PreferenceStore::open(config.preferences_path()));
    let hub = Arc::new(StationHub::new(
        feed,
        SnapshotStore::new(config.snapshot_path()),
        prefs,
        config.feed_timeout,
    ));

    // Subscribe before the first update so the startup event is logged too
    tokio::spawn(services::notifier::run_notifier(hub.subscribe()));
    hub.initialize().await;

    // Create shared poller state and spawn background poller
    let poller_state: SharedPollerState = Arc::new(RwLock::new(PollerState::new()));
    tokio::spawn(services::poller::run_poller(hub.clone(), poller_state.clone()));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::PUT,
            axum::http::Method::POST,
        ])
        .allow_headers(Any);

    let app = routes::router(hub, poller_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);
    tracing::info!(
        "Swagger UI available at http://localhost:{}/swagger-ui/",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");
    axum::serve(listener, app)
        .await
        .expect("Server terminated unexpectedly");
}
