//! The application object tying station data to the user's state.
//!
//! The hub owns the in-memory snapshot and the current notice. Every change
//! that can move the selection (new data, new action, new location, new
//! settings) funnels through `update`, which is serialized by one mutex and
//! publishes exactly one `HubEvent` per call.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, Notify, RwLock};
use utoipa::ToSchema;

use crate::errors::AppError;
use crate::services::action::{Action, ActionManager, ActionState};
use crate::services::feed::FeedClient;
use crate::services::location::{Location, LocationManager};
use crate::services::notice::{build_notice, NoticeContext, SelectionMemo, StationNotice};
use crate::services::ranking::{order_closest_stations, RankingStrategy};
use crate::services::selector::{closest_available, Requirement};
use crate::services::settings::{Settings, SettingsUpdate};
use crate::store::models::StationSnapshot;
use crate::store::preferences::PreferenceStore;
use crate::store::snapshot::SnapshotStore;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Why an update ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UpdateReason {
    Startup,
    SnapshotRefreshed,
    ActionChanged,
    LocationChanged,
    SettingsChanged,
    DisclaimerAgreed,
}

/// What an update did to the notice.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "kind", content = "notice", rename_all = "lowercase")]
pub enum NoticeUpdate {
    Posted(StationNotice),
    Cancelled,
    /// Not enough data to decide; whatever was shown stays.
    Retained,
}

/// Published once per update.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct HubEvent {
    pub reason: UpdateReason,
    pub notice: NoticeUpdate,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct UpdateState {
    previous: Option<SelectionMemo>,
    notice: Option<StationNotice>,
}

/// Everything needed to rank the current snapshot for the current user.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingContext {
    pub action: ActionState,
    pub strategy: Option<RankingStrategy>,
    pub requirement: Requirement,
}

pub struct StationHub {
    feed: FeedClient,
    store: Arc<SnapshotStore>,
    settings: Settings,
    actions: ActionManager,
    locations: LocationManager,
    snapshot: RwLock<Option<Arc<StationSnapshot>>>,
    update_state: Mutex<UpdateState>,
    events: broadcast::Sender<HubEvent>,
    sync_requested: Notify,
    schedule_changed: Notify,
    inline_fetch_timeout: Duration,
}

impl StationHub {
    pub fn new(
        feed: FeedClient,
        store: SnapshotStore,
        prefs: Arc<PreferenceStore>,
        inline_fetch_timeout: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            feed,
            store: Arc::new(store),
            settings: Settings::new(prefs.clone()),
            actions: ActionManager::new(prefs.clone()),
            locations: LocationManager::new(prefs),
            snapshot: RwLock::new(None),
            update_state: Mutex::new(UpdateState::default()),
            events,
            sync_requested: Notify::new(),
            schedule_changed: Notify::new(),
            inline_fetch_timeout,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn actions(&self) -> &ActionManager {
        &self.actions
    }

    pub fn locations(&self) -> &LocationManager {
        &self.locations
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.events.subscribe()
    }

    /// Restore the persisted snapshot, if any, and run the first update.
    pub async fn initialize(&self) -> HubEvent {
        match self.load_persisted().await {
            Ok(Some(snapshot)) => {
                tracing::info!("Restored {} stations from disk", snapshot.len());
                *self.snapshot.write().await = Some(Arc::new(snapshot));
            }
            Ok(None) => tracing::info!(
                "No station snapshot at {}, waiting for first sync",
                self.store.path().display()
            ),
            Err(e) => tracing::warn!("Failed to restore station snapshot: {}", e),
        }
        self.update(UpdateReason::Startup).await
    }

    /// Fetch the feed and, on success, make it the current snapshot.
    pub async fn refresh(&self) -> Result<Arc<StationSnapshot>, AppError> {
        match self.feed.fetch_snapshot().await {
            Ok(snapshot) => Ok(self.insert(snapshot).await),
            Err(e) => {
                tracing::warn!("Station sync from {} failed: {}", self.feed.url(), e);
                Err(e)
            }
        }
    }

    /// Replace the current snapshot, persist it and recompute.
    ///
    /// A failed write is logged; the in-memory copy is still used.
    pub async fn insert(&self, snapshot: StationSnapshot) -> Arc<StationSnapshot> {
        let snapshot = Arc::new(snapshot);
        *self.snapshot.write().await = Some(snapshot.clone());

        let store = self.store.clone();
        let to_save = snapshot.clone();
        if let Err(e) = persist(move || store.save(&to_save)).await {
            tracing::warn!("Failed to persist station snapshot: {}", e);
        }

        self.update(UpdateReason::SnapshotRefreshed).await;
        snapshot
    }

    /// The snapshot held in memory, without touching disk or network.
    pub async fn cached_snapshot(&self) -> Option<Arc<StationSnapshot>> {
        self.snapshot.read().await.clone()
    }

    /// Best available snapshot: memory, then disk, then an inline download.
    ///
    /// When all three come up empty, an expedited sync is requested from the
    /// poller and `None` is returned.
    pub async fn snapshot(&self) -> Option<Arc<StationSnapshot>> {
        if let Some(snapshot) = self.cached_snapshot().await {
            return Some(snapshot);
        }

        match self.load_persisted().await {
            Ok(Some(snapshot)) => {
                let snapshot = Arc::new(snapshot);
                let mut slot = self.snapshot.write().await;
                // A sync may have landed while we were reading.
                return Some(slot.get_or_insert(snapshot).clone());
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to read stored station snapshot: {}", e),
        }

        tracing::info!("No station data available, downloading inline");
        match tokio::time::timeout(self.inline_fetch_timeout, self.feed.fetch_snapshot()).await {
            Ok(Ok(snapshot)) => return Some(self.insert(snapshot).await),
            Ok(Err(e)) => tracing::warn!("Inline station download failed: {}", e),
            Err(_) => tracing::warn!(
                "Inline station download timed out after {:?}",
                self.inline_fetch_timeout
            ),
        }

        self.request_sync();
        None
    }

    async fn load_persisted(&self) -> Result<Option<StationSnapshot>, AppError> {
        let store = self.store.clone();
        persist(move || store.load()).await
    }

    /// Ask the poller to sync now instead of waiting for its next period.
    pub fn request_sync(&self) {
        self.sync_requested.notify_one();
    }

    pub async fn sync_requested(&self) {
        self.sync_requested.notified().await
    }

    pub async fn schedule_changed(&self) {
        self.schedule_changed.notified().await
    }

    /// Sync period for the current action.
    pub fn sync_period(&self) -> Duration {
        self.actions.current().action.cadence().sync_period
    }

    /// Store a new action. Returns the resulting event, or `None` when the
    /// stored action was already `state`.
    pub async fn set_action(&self, state: &ActionState) -> Result<Option<HubEvent>, AppError> {
        let actions = self.actions.clone();
        let next = state.clone();
        if !persist(move || actions.set(&next)).await? {
            return Ok(None);
        }
        tracing::info!("Action changed to {}", state);
        self.schedule_changed.notify_one();
        Ok(Some(self.update(UpdateReason::ActionChanged).await))
    }

    pub async fn set_location(&self, location: &Location) -> Result<HubEvent, AppError> {
        let locations = self.locations.clone();
        let location = *location;
        persist(move || locations.set_last_location(&location)).await?;
        Ok(self.update(UpdateReason::LocationChanged).await)
    }

    pub async fn update_settings(&self, update: &SettingsUpdate) -> Result<HubEvent, AppError> {
        let thresholds = [update.empty_threshold, update.full_threshold];
        for threshold in thresholds.into_iter().flatten() {
            if threshold < 0 {
                return Err(AppError::BadRequest(format!(
                    "Thresholds must not be negative, got {}",
                    threshold
                )));
            }
        }
        let settings = self.settings.clone();
        let update = update.clone();
        persist(move || settings.apply(&update)).await?;
        Ok(self.update(UpdateReason::SettingsChanged).await)
    }

    pub async fn agree_disclaimer(&self, version: i64) -> Result<HubEvent, AppError> {
        let settings = self.settings.clone();
        persist(move || settings.agree_disclaimer(version)).await?;
        Ok(self.update(UpdateReason::DisclaimerAgreed).await)
    }

    pub fn ranking_context(&self) -> RankingContext {
        let action = self.actions.current();
        let location = self.locations.last_location().map(|l| l.coordinate());
        let destination = match action.action {
            Action::Riding => self.actions.destination_coordinate(&self.settings),
            _ => None,
        };
        RankingContext {
            strategy: RankingStrategy::select(action.action, location, destination),
            requirement: Requirement::for_action(action.action, self.settings.thresholds()),
            action,
        }
    }

    pub async fn current_notice(&self) -> Option<StationNotice> {
        self.update_state.lock().await.notice.clone()
    }

    /// Recompute the notice and publish the outcome.
    pub async fn update(&self, reason: UpdateReason) -> HubEvent {
        let mut state = self.update_state.lock().await;
        let snapshot = self.cached_snapshot().await;
        let notice = self.evaluate(snapshot.as_deref(), &mut state);

        let event = HubEvent {
            reason,
            notice,
            at: Utc::now(),
        };
        tracing::debug!("Update for {:?}: {:?}", reason, event.notice);
        // No subscribers is fine; the event is also returned.
        let _ = self.events.send(event.clone());
        event
    }

    fn evaluate(
        &self,
        snapshot: Option<&StationSnapshot>,
        state: &mut UpdateState,
    ) -> NoticeUpdate {
        if !self.settings.is_disclaimer_agreed() {
            state.notice = None;
            return NoticeUpdate::Cancelled;
        }

        let context = self.ranking_context();
        if context.action.action == Action::Silenced {
            state.notice = None;
            return NoticeUpdate::Cancelled;
        }

        let Some(snapshot) = snapshot else {
            return NoticeUpdate::Retained;
        };
        if context.strategy.is_none() {
            return NoticeUpdate::Retained;
        }
        let ordered = order_closest_stations(snapshot.stations(), context.strategy);
        let Some(selected) = closest_available(&ordered, context.requirement) else {
            return NoticeUpdate::Retained;
        };

        let notice = build_notice(
            &selected,
            &NoticeContext {
                action: context.action.action,
                destination_name: context.action.effective_destination(),
                vibration_enabled: self.settings.vibration_enabled(),
                previous: state.previous,
            },
        );
        state.previous = Some(SelectionMemo::of(&selected));
        state.notice = Some(notice.clone());
        NoticeUpdate::Posted(notice)
    }
}

/// Run a blocking store operation on the blocking pool.
async fn persist<T, F>(op: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::notice::{BUZZ_RANK_0, BUZZ_SILENT};
    use crate::services::settings::DISCLAIMER_VERSION;
    use crate::store::models::fixtures::{snapshot, station};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const UNREACHABLE_FEED: &str = "http://127.0.0.1:9/stations/json";

    fn hub_with_feed(url: &str, dir: &tempfile::TempDir) -> StationHub {
        let feed = FeedClient::new(url, "rollout-test/1.0", Duration::from_secs(2)).unwrap();
        StationHub::new(
            feed,
            SnapshotStore::new(dir.path().join("stations.json")),
            Arc::new(PreferenceStore::in_memory()),
            Duration::from_secs(2),
        )
    }

    fn here() -> Location {
        Location {
            latitude: 40.7417806,
            longitude: -74.0045012,
            recorded_at: Utc::now(),
        }
    }

    fn stations() -> StationSnapshot {
        snapshot(vec![
            station(1, 40.7420, -74.0045, 0, 10),
            station(2, 40.7440, -74.0045, 3, 0),
            station(3, 40.7480, -74.0045, 5, 5),
        ])
    }

    async fn ready_hub(dir: &tempfile::TempDir) -> StationHub {
        let hub = hub_with_feed(UNREACHABLE_FEED, dir);
        hub.agree_disclaimer(DISCLAIMER_VERSION).await.unwrap();
        hub.set_location(&here()).await.unwrap();
        hub
    }

    #[tokio::test]
    async fn test_disclaimer_gates_notice() {
        let dir = tempfile::tempdir().unwrap();
        let hub = hub_with_feed(UNREACHABLE_FEED, &dir);
        hub.set_location(&here()).await.unwrap();

        let event = hub.insert_and_event(stations()).await;
        assert_eq!(event.notice, NoticeUpdate::Cancelled);
        assert_eq!(hub.current_notice().await, None);

        let event = hub.agree_disclaimer(DISCLAIMER_VERSION).await.unwrap();
        assert!(matches!(event.notice, NoticeUpdate::Posted(_)));
    }

    #[tokio::test]
    async fn test_searching_selects_first_with_bikes() {
        let dir = tempfile::tempdir().unwrap();
        let hub = ready_hub(&dir).await;
        hub.insert(stations()).await;

        let event = hub
            .set_action(&ActionState::new(Action::Searching))
            .await
            .unwrap()
            .unwrap();
        let NoticeUpdate::Posted(notice) = event.notice else {
            panic!("expected a posted notice, got {:?}", event.notice);
        };
        assert_eq!(notice.station_id, 2);
        assert_eq!(notice.rank, 1);
        assert!(notice.text.starts_with("Rank: 2\nBikes: 3"));
        assert_eq!(notice.vibration.as_deref(), Some(BUZZ_SILENT));
    }

    #[tokio::test]
    async fn test_same_action_twice_publishes_once() {
        let dir = tempfile::tempdir().unwrap();
        let hub = ready_hub(&dir).await;
        let mut rx = hub.subscribe();

        let state = ActionState::riding_to("Home");
        assert!(hub.set_action(&state).await.unwrap().is_some());
        assert!(hub.set_action(&state).await.unwrap().is_none());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.reason, UpdateReason::ActionChanged);
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_same_action_publishes_once() {
        let dir = tempfile::tempdir().unwrap();
        let hub = Arc::new(ready_hub(&dir).await);
        let mut rx = hub.subscribe();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let hub = hub.clone();
                tokio::spawn(async move {
                    hub.set_action(&ActionState::riding_to("Work")).await.unwrap()
                })
            })
            .collect();
        let mut published = 0;
        for task in tasks {
            if task.await.unwrap().is_some() {
                published += 1;
            }
        }
        assert_eq!(published, 1);
        assert_eq!(rx.recv().await.unwrap().reason, UpdateReason::ActionChanged);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_preference_edits_reach_disk() {
        let dir = tempfile::tempdir().unwrap();
        let prefs_path = dir.path().join("preferences.json");
        let feed = FeedClient::new(UNREACHABLE_FEED, "rollout-test/1.0", Duration::from_secs(2))
            .unwrap();
        let hub = StationHub::new(
            feed,
            SnapshotStore::new(dir.path().join("stations.json")),
            Arc::new(PreferenceStore::open(&prefs_path)),
            Duration::from_secs(2),
        );

        hub.set_location(&here()).await.unwrap();
        hub.set_action(&ActionState::riding_to("Home")).await.unwrap();
        hub.agree_disclaimer(DISCLAIMER_VERSION).await.unwrap();

        let reopened = Arc::new(PreferenceStore::open(&prefs_path));
        assert_eq!(
            ActionManager::new(reopened.clone()).current(),
            ActionState::riding_to("Home")
        );
        assert!(Settings::new(reopened.clone()).is_disclaimer_agreed());
        let location = LocationManager::new(reopened).last_location().unwrap();
        assert_eq!(location.latitude, here().latitude);
    }

    #[tokio::test]
    async fn test_silenced_cancels_notice() {
        let dir = tempfile::tempdir().unwrap();
        let hub = ready_hub(&dir).await;
        hub.insert(stations()).await;
        assert!(hub.current_notice().await.is_some());

        let event = hub
            .set_action(&ActionState::new(Action::Silenced))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.notice, NoticeUpdate::Cancelled);
        assert_eq!(hub.current_notice().await, None);
    }

    #[tokio::test]
    async fn test_no_qualifying_station_retains_notice() {
        let dir = tempfile::tempdir().unwrap();
        let hub = ready_hub(&dir).await;
        hub.insert(stations()).await;
        let before = hub.current_notice().await;
        assert!(before.is_some());

        let event = hub
            .update_settings(&SettingsUpdate {
                empty_threshold: Some(50),
                ..SettingsUpdate::default()
            })
            .await
            .unwrap();
        assert_eq!(event.notice, NoticeUpdate::Retained);
        assert_eq!(hub.current_notice().await, before);
    }

    #[tokio::test]
    async fn test_riding_buzzes_only_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let hub = ready_hub(&dir).await;
        hub.update_settings(&SettingsUpdate {
            vibration_enabled: Some(true),
            ..SettingsUpdate::default()
        })
        .await
        .unwrap();
        hub.insert(stations()).await;

        let event = hub
            .set_action(&ActionState::riding_to("Somewhere"))
            .await
            .unwrap()
            .unwrap();
        let NoticeUpdate::Posted(notice) = event.notice else {
            panic!("expected a posted notice");
        };
        assert_eq!(notice.station_id, 1);
        assert_eq!(notice.vibration.as_deref(), Some(BUZZ_RANK_0));

        // Same station, same counts.
        let event = hub.set_location(&here()).await.unwrap();
        let NoticeUpdate::Posted(notice) = event.notice else {
            panic!("expected a posted notice");
        };
        assert_eq!(notice.vibration.as_deref(), Some(BUZZ_SILENT));
    }

    #[tokio::test]
    async fn test_negative_threshold_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let hub = ready_hub(&dir).await;
        let result = hub
            .update_settings(&SettingsUpdate {
                full_threshold: Some(-1),
                ..SettingsUpdate::default()
            })
            .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_snapshot_falls_back_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        SnapshotStore::new(dir.path().join("stations.json"))
            .save(&stations())
            .unwrap();

        let hub = hub_with_feed(UNREACHABLE_FEED, &dir);
        let snapshot = hub.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 3);
        assert!(hub.cached_snapshot().await.is_some());
    }

    #[tokio::test]
    async fn test_snapshot_downloads_inline_and_persists() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&stations()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let hub = hub_with_feed(&format!("{}/stations/json", server.uri()), &dir);
        let snapshot = hub.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 3);
        assert!(snapshot.timestamp.is_some());

        let stored = SnapshotStore::new(dir.path().join("stations.json"))
            .load()
            .unwrap()
            .unwrap();
        assert_eq!(stored.len(), 3);
    }

    #[tokio::test]
    async fn test_snapshot_unavailable_requests_sync() {
        let dir = tempfile::tempdir().unwrap();
        let hub = hub_with_feed(UNREACHABLE_FEED, &dir);
        assert!(hub.snapshot().await.is_none());

        // The stored permit makes this return immediately.
        tokio::time::timeout(Duration::from_secs(1), hub.sync_requested())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_initialize_restores_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        SnapshotStore::new(dir.path().join("stations.json"))
            .save(&stations())
            .unwrap();

        let hub = hub_with_feed(UNREACHABLE_FEED, &dir);
        let event = hub.initialize().await;
        assert_eq!(event.reason, UpdateReason::Startup);
        assert_eq!(hub.cached_snapshot().await.map(|s| s.len()), Some(3));
    }

    #[tokio::test]
    async fn test_ranking_context_uses_destination_when_riding() {
        let dir = tempfile::tempdir().unwrap();
        let hub = ready_hub(&dir).await;
        hub.update_settings(&SettingsUpdate {
            home: Some(crate::services::settings::DestinationUpdate {
                active: true,
                latitude: Some(40.70),
                longitude: Some(-74.01),
            }),
            ..SettingsUpdate::default()
        })
        .await
        .unwrap();

        hub.set_action(&ActionState::riding_to("Home")).await.unwrap();
        assert!(matches!(
            hub.ranking_context().strategy,
            Some(RankingStrategy::ByDestination { .. })
        ));
        assert_eq!(
            hub.ranking_context().requirement,
            Requirement::Docks { more_than: 0 }
        );

        hub.set_action(&ActionState::riding_to("Gym")).await.unwrap();
        assert!(matches!(
            hub.ranking_context().strategy,
            Some(RankingStrategy::ByLocation { .. })
        ));
    }

    impl StationHub {
        /// Insert and hand back the event the insert published.
        async fn insert_and_event(&self, snapshot: StationSnapshot) -> HubEvent {
            let mut rx = self.subscribe();
            self.insert(snapshot).await;
            rx.recv().await.unwrap()
        }
    }
}
