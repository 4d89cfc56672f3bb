//! Background poller for the station feed.
//!
//! Syncs on the current action's period: every minute while searching or
//! riding, much less often when idle or silenced.
//!
//! Architecture:
//! - Wakes one sync period (of the current action) after the last sync
//! - Wakes early when the hub asks for an expedited sync (no data available)
//! - When the action changes mid-sleep, re-plans the wakeup from the last
//!   sync, syncing at once if the new period has already passed
//! - State is in-memory (`Arc<RwLock<PollerState>>`); a restart just syncs again

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Instant;
use utoipa::ToSchema;

use crate::services::hub::StationHub;

/// Shortest gap between two syncs, even when several are requested back to back.
const POLLER_MIN_INTERVAL_SECS: u64 = 5;

/// Outcome of the most recent sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PollResult {
    Pending,
    Success,
    Error,
}

/// Global poller state, exposed via the status endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PollerState {
    pub active: bool,
    pub next_wakeup_at: Option<DateTime<Utc>>,
    pub last_poll_completed_at: Option<DateTime<Utc>>,
    pub last_poll_duration_ms: Option<u64>,
    pub total_polls: u64,
    pub last_poll_result: PollResult,
    /// Stations in the last successful sync
    pub station_count: Option<usize>,
    /// Upstream `executionTime` of the last successful sync
    pub execution_time: Option<String>,
}

impl PollerState {
    pub fn new() -> Self {
        Self {
            active: true,
            next_wakeup_at: None,
            last_poll_completed_at: None,
            last_poll_duration_ms: None,
            total_polls: 0,
            last_poll_result: PollResult::Pending,
            station_count: None,
            execution_time: None,
        }
    }
}

impl Default for PollerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared poller state handle.
pub type SharedPollerState = Arc<RwLock<PollerState>>;

/// Why the poller stopped sleeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    PeriodElapsed,
    SyncRequested,
    ScheduleChanged,
}

/// Run the background poller. This function never returns (runs until process exit).
///
/// Should be spawned via `tokio::spawn(run_poller(...))`.
pub async fn run_poller(hub: Arc<StationHub>, state: SharedPollerState) {
    tracing::info!("Background poller started");

    loop {
        poll_once(&hub, &state).await;
        let last_sync = Instant::now();

        // Re-plan without syncing for as long as only the schedule changes.
        loop {
            let period = hub.sync_period();
            let deadline = next_deadline(last_sync, period);
            {
                let remaining = deadline.saturating_duration_since(Instant::now());
                let mut s = state.write().await;
                s.next_wakeup_at = chrono::Duration::from_std(remaining)
                    .ok()
                    .map(|d| Utc::now() + d);
            }
            tracing::debug!("Poller: next sync {:?} after the last one", period);

            match sleep_or_wake(&hub, deadline).await {
                Wake::ScheduleChanged => {
                    tracing::debug!("Poller: action changed, re-planning");
                    continue;
                }
                Wake::SyncRequested => {
                    tracing::info!("Poller: expedited sync requested");
                    break;
                }
                Wake::PeriodElapsed => break,
            }
        }

        tokio::time::sleep(Duration::from_secs(POLLER_MIN_INTERVAL_SECS)).await;
    }
}

/// When the next sync is due. Always measured from the last sync, so
/// frequent action changes cannot keep pushing it back.
fn next_deadline(last_sync: Instant, period: Duration) -> Instant {
    last_sync + period
}

async fn sleep_or_wake(hub: &StationHub, deadline: Instant) -> Wake {
    tokio::select! {
        _ = tokio::time::sleep_until(deadline) => Wake::PeriodElapsed,
        _ = hub.sync_requested() => Wake::SyncRequested,
        _ = hub.schedule_changed() => Wake::ScheduleChanged,
    }
}

/// Sync once and record the outcome.
pub async fn poll_once(hub: &StationHub, state: &SharedPollerState) {
    let started = Instant::now();
    let result = hub.refresh().await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let mut s = state.write().await;
    s.total_polls += 1;
    s.last_poll_completed_at = Some(Utc::now());
    s.last_poll_duration_ms = Some(elapsed_ms);
    match result {
        Ok(snapshot) => {
            tracing::info!(
                "Poller: synced {} stations in {}ms",
                snapshot.len(),
                elapsed_ms
            );
            s.last_poll_result = PollResult::Success;
            s.station_count = Some(snapshot.len());
            s.execution_time = snapshot.execution_time.clone();
        }
        Err(_) => {
            // The hub already logged the failure.
            s.last_poll_result = PollResult::Error;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::feed::FeedClient;
    use crate::store::models::fixtures::{snapshot, station};
    use crate::store::preferences::PreferenceStore;
    use crate::store::snapshot::SnapshotStore;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn far_future() -> Instant {
        Instant::now() + Duration::from_secs(3600)
    }

    fn hub(url: &str, dir: &tempfile::TempDir) -> StationHub {
        StationHub::new(
            FeedClient::new(url, "rollout-test/1.0", Duration::from_secs(2)).unwrap(),
            SnapshotStore::new(dir.path().join("stations.json")),
            Arc::new(PreferenceStore::in_memory()),
            Duration::from_secs(2),
        )
    }

    #[test]
    fn test_poller_state_new() {
        let s = PollerState::new();
        assert!(s.active);
        assert_eq!(s.total_polls, 0);
        assert_eq!(s.last_poll_result, PollResult::Pending);
        assert!(s.next_wakeup_at.is_none());
    }

    #[tokio::test]
    async fn test_poll_once_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(&snapshot(vec![station(1, 40.0, -74.0, 1, 1)])),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let hub = hub(&format!("{}/stations/json", server.uri()), &dir);
        let state: SharedPollerState = Arc::new(RwLock::new(PollerState::new()));

        poll_once(&hub, &state).await;

        let s = state.read().await;
        assert_eq!(s.total_polls, 1);
        assert_eq!(s.last_poll_result, PollResult::Success);
        assert_eq!(s.station_count, Some(1));
        assert_eq!(s.execution_time.as_deref(), Some("2014-10-19 08:41:02 PM"));
        assert!(hub.cached_snapshot().await.is_some());
    }

    #[tokio::test]
    async fn test_poll_once_failure_keeps_last_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let hub = hub(&format!("{}/stations/json", server.uri()), &dir);
        let state: SharedPollerState = Arc::new(RwLock::new(PollerState {
            station_count: Some(7),
            ..PollerState::new()
        }));

        poll_once(&hub, &state).await;

        let s = state.read().await;
        assert_eq!(s.last_poll_result, PollResult::Error);
        assert_eq!(s.station_count, Some(7));
        assert!(hub.cached_snapshot().await.is_none());
    }

    #[tokio::test]
    async fn test_sync_request_wakes_sleep() {
        let dir = tempfile::tempdir().unwrap();
        let hub = hub("http://127.0.0.1:9/stations/json", &dir);
        hub.request_sync();
        let wake = sleep_or_wake(&hub, far_future()).await;
        assert_eq!(wake, Wake::SyncRequested);
    }

    #[tokio::test]
    async fn test_action_change_wakes_sleep() {
        let dir = tempfile::tempdir().unwrap();
        let hub = hub("http://127.0.0.1:9/stations/json", &dir);
        hub.set_action(&crate::services::action::ActionState::new(
            crate::services::action::Action::Searching,
        ))
        .await
        .unwrap();
        let wake = sleep_or_wake(&hub, far_future()).await;
        assert_eq!(wake, Wake::ScheduleChanged);
        assert_eq!(hub.sync_period(), Duration::from_secs(60));
    }

    #[test]
    fn test_deadline_measured_from_last_sync() {
        let last_sync = Instant::now();
        let period = Duration::from_secs(60);
        assert_eq!(next_deadline(last_sync, period), last_sync + period);
    }

    #[tokio::test]
    async fn test_shorter_period_already_passed_wakes_at_once() {
        let dir = tempfile::tempdir().unwrap();
        let hub = hub("http://127.0.0.1:9/stations/json", &dir);
        hub.set_action(&crate::services::action::ActionState::new(
            crate::services::action::Action::Searching,
        ))
        .await
        .unwrap();
        // Consume the schedule change, as the poller loop would.
        assert_eq!(
            sleep_or_wake(&hub, far_future()).await,
            Wake::ScheduleChanged
        );

        // Last sync two minutes ago; the searching period is one minute.
        let last_sync = Instant::now() - Duration::from_secs(120);
        let deadline = next_deadline(last_sync, hub.sync_period());
        let wake = tokio::time::timeout(Duration::from_secs(1), sleep_or_wake(&hub, deadline))
            .await
            .expect("an overdue sync should not wait");
        assert_eq!(wake, Wake::PeriodElapsed);
    }
}
