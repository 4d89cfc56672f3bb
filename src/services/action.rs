//! The user's current bike-share intent and how it is persisted.
//!
//! The action is stored as a pair: an integer code and an optional
//! destination name. The destination only matters while riding, but it is
//! stored as given for any action. Setting the same pair again is a no-op.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::errors::AppError;
use crate::services::geo::Coordinate;
use crate::services::settings::Settings;
use crate::store::preferences::PreferenceStore;

pub(crate) const ACTION_KEY: &str = "ActionManagerKey";
pub(crate) const DESTINATION_KEY: &str = "ActionManagerDestinationKey";

pub const DESTINATION_NAME_HOME: &str = "Home";
pub const DESTINATION_NAME_WORK: &str = "Work";

const MINUTE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Idle,
    Searching,
    Riding,
    Silenced,
}

impl Action {
    pub fn code(self) -> i64 {
        match self {
            Action::Idle => 0,
            Action::Searching => 1,
            Action::Riding => 2,
            Action::Silenced => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Action::Idle),
            1 => Some(Action::Searching),
            2 => Some(Action::Riding),
            3 => Some(Action::Silenced),
            _ => None,
        }
    }

    /// How often station data and location should be refreshed while in this action.
    pub fn cadence(self) -> ActionCadence {
        match self {
            Action::Searching => ActionCadence::new(MINUTE, MINUTE, true),
            Action::Riding => ActionCadence::new(MINUTE, MINUTE / 2, true),
            Action::Idle => ActionCadence::new(5 * MINUTE, 10 * MINUTE, false),
            Action::Silenced => ActionCadence::new(20 * MINUTE, 60 * MINUTE, false),
        }
    }
}

/// Refresh rates tied to an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionCadence {
    /// Period between station feed syncs.
    pub sync_period: Duration,
    /// Requested period between location reports.
    pub location_interval: Duration,
    /// Lower bound between location reports: half the interval, at most a minute.
    pub fastest_location_interval: Duration,
    pub high_accuracy: bool,
}

impl ActionCadence {
    fn new(sync_period: Duration, location_interval: Duration, high_accuracy: bool) -> Self {
        Self {
            sync_period,
            location_interval,
            fastest_location_interval: (location_interval / 2).min(MINUTE),
            high_accuracy,
        }
    }
}

/// A named destination the user can ride towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Destination {
    Home,
    Work,
}

impl Destination {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            DESTINATION_NAME_HOME => Some(Destination::Home),
            DESTINATION_NAME_WORK => Some(Destination::Work),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Destination::Home => DESTINATION_NAME_HOME,
            Destination::Work => DESTINATION_NAME_WORK,
        }
    }
}

/// The persisted (action, destination name) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ActionState {
    pub action: Action,
    /// Destination name; only meaningful while riding. `null` means roaming.
    #[serde(default)]
    pub destination: Option<String>,
}

impl ActionState {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            destination: None,
        }
    }

    pub fn riding_to(destination: impl Into<String>) -> Self {
        Self {
            action: Action::Riding,
            destination: Some(destination.into()),
        }
    }

    /// The destination name, if the user is riding towards one.
    pub fn effective_destination(&self) -> Option<&str> {
        match self.action {
            Action::Riding => self.destination.as_deref(),
            _ => None,
        }
    }

    pub fn display_name(&self) -> String {
        match (self.action, self.destination.as_deref()) {
            (Action::Idle, _) => "Idle".to_string(),
            (Action::Searching, _) => "Searching for a bike".to_string(),
            (Action::Silenced, _) => "Silenced".to_string(),
            (Action::Riding, Some(name)) => format!("Riding to {}", name),
            (Action::Riding, None) => "Roaming on a bike".to_string(),
        }
    }
}

impl Default for ActionState {
    fn default() -> Self {
        Self::new(Action::Idle)
    }
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

/// Reads and writes the current action in the preference store.
#[derive(Debug, Clone)]
pub struct ActionManager {
    prefs: Arc<PreferenceStore>,
}

impl ActionManager {
    pub fn new(prefs: Arc<PreferenceStore>) -> Self {
        Self { prefs }
    }

    pub fn current(&self) -> ActionState {
        let code = self.prefs.get_i64(ACTION_KEY, Action::Idle.code());
        let action = Action::from_code(code).unwrap_or_else(|| {
            tracing::warn!("Unknown stored action code {}, treating as idle", code);
            Action::Idle
        });
        ActionState {
            action,
            destination: self.prefs.get_string(DESTINATION_KEY),
        }
    }

    /// Store `state` if it differs from the stored pair.
    ///
    /// Returns `true` when something changed. The comparison and the write
    /// happen under one store lock. A store that has never held an action
    /// always counts as changed, even when setting the default.
    pub fn set(&self, state: &ActionState) -> Result<bool, AppError> {
        self.prefs.edit(|values| {
            values.insert(ACTION_KEY.to_string(), json!(state.action.code()));
            match &state.destination {
                Some(name) => {
                    values.insert(DESTINATION_KEY.to_string(), json!(name));
                }
                None => {
                    values.remove(DESTINATION_KEY);
                }
            }
        })
    }

    /// Coordinate of the stored destination, if it names a configured place.
    ///
    /// Unknown names and unset or unparseable destinations resolve to `None`.
    pub fn destination_coordinate(&self, settings: &Settings) -> Option<Coordinate> {
        let name = self.prefs.get_string(DESTINATION_KEY)?;
        settings.destination(Destination::from_name(&name)?)
    }
}
