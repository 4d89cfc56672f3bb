//! User-facing settings backed by the preference store.
//!
//! Thresholds and coordinates are stored as strings and parsed on every read,
//! so a bad value degrades to its default instead of failing a request.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::errors::AppError;
use crate::helpers::{parse_coordinate, parse_threshold};
use crate::services::action::Destination;
use crate::services::geo::Coordinate;
use crate::services::selector::Thresholds;
use crate::store::preferences::{PreferenceMap, PreferenceStore};

pub const PREF_ENABLE_VIBRATION: &str = "pref_enable_vibration";
pub const PREF_EMPTY_THRESHOLD: &str = "pref_empty_threshold";
pub const PREF_FULL_THRESHOLD: &str = "pref_full_threshold";
pub const PREF_DESTINATION_HOME_SET: &str = "pref_destination_home_set";
pub const PREF_DESTINATION_HOME_LATITUDE: &str = "pref_destination_home_latitude";
pub const PREF_DESTINATION_HOME_LONGITUDE: &str = "pref_destination_home_longitude";
pub const PREF_DESTINATION_WORK_SET: &str = "pref_destination_work_set";
pub const PREF_DESTINATION_WORK_LATITUDE: &str = "pref_destination_work_latitude";
pub const PREF_DESTINATION_WORK_LONGITUDE: &str = "pref_destination_work_longitude";
/// Set when the user accepts the disclaimer, never from the settings form.
pub const PREF_AGREED_DISCLAIMER_VERSION: &str = "pref_agreed_disclaimer_version";

/// Current disclaimer version; users must have agreed to at least this one.
pub const DISCLAIMER_VERSION: i64 = 1;

/// Partial settings change. Absent fields are left as they are.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct SettingsUpdate {
    pub vibration_enabled: Option<bool>,
    /// Stations with this many bikes or fewer count as empty
    pub empty_threshold: Option<i32>,
    /// Stations with this many open docks or fewer count as full
    pub full_threshold: Option<i32>,
    pub home: Option<DestinationUpdate>,
    pub work: Option<DestinationUpdate>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct DestinationUpdate {
    pub active: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

struct DestinationKeys {
    set: &'static str,
    latitude: &'static str,
    longitude: &'static str,
}

fn destination_keys(destination: Destination) -> DestinationKeys {
    match destination {
        Destination::Home => DestinationKeys {
            set: PREF_DESTINATION_HOME_SET,
            latitude: PREF_DESTINATION_HOME_LATITUDE,
            longitude: PREF_DESTINATION_HOME_LONGITUDE,
        },
        Destination::Work => DestinationKeys {
            set: PREF_DESTINATION_WORK_SET,
            latitude: PREF_DESTINATION_WORK_LATITUDE,
            longitude: PREF_DESTINATION_WORK_LONGITUDE,
        },
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    prefs: Arc<PreferenceStore>,
}

impl Settings {
    pub fn new(prefs: Arc<PreferenceStore>) -> Self {
        Self { prefs }
    }

    pub fn vibration_enabled(&self) -> bool {
        self.prefs.get_bool(PREF_ENABLE_VIBRATION, false)
    }

    pub fn empty_threshold(&self) -> i32 {
        parse_threshold(
            PREF_EMPTY_THRESHOLD,
            self.prefs.get_string(PREF_EMPTY_THRESHOLD).as_deref(),
        )
    }

    pub fn full_threshold(&self) -> i32 {
        parse_threshold(
            PREF_FULL_THRESHOLD,
            self.prefs.get_string(PREF_FULL_THRESHOLD).as_deref(),
        )
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            empty: self.empty_threshold(),
            full: self.full_threshold(),
        }
    }

    pub fn is_destination_active(&self, destination: Destination) -> bool {
        self.prefs.get_bool(destination_keys(destination).set, false)
    }

    /// Stored coordinate of `destination`, regardless of whether it is active.
    pub fn destination(&self, destination: Destination) -> Option<Coordinate> {
        let keys = destination_keys(destination);
        parse_coordinate(
            destination.name(),
            self.prefs.get_string(keys.latitude).as_deref(),
            self.prefs.get_string(keys.longitude).as_deref(),
        )
    }

    pub fn agreed_disclaimer_version(&self) -> Option<i64> {
        self.prefs
            .get(PREF_AGREED_DISCLAIMER_VERSION)
            .and_then(|v| v.as_i64())
    }

    pub fn is_disclaimer_agreed(&self) -> bool {
        self.agreed_disclaimer_version().unwrap_or(-1) >= DISCLAIMER_VERSION
    }

    pub fn agree_disclaimer(&self, version: i64) -> Result<(), AppError> {
        self.prefs.edit(|values| {
            values.insert(PREF_AGREED_DISCLAIMER_VERSION.to_string(), json!(version));
        })?;
        Ok(())
    }

    /// Apply a partial update in a single write.
    pub fn apply(&self, update: &SettingsUpdate) -> Result<(), AppError> {
        self.prefs.edit(|values| {
            if let Some(enabled) = update.vibration_enabled {
                values.insert(PREF_ENABLE_VIBRATION.to_string(), json!(enabled));
            }
            if let Some(empty) = update.empty_threshold {
                values.insert(PREF_EMPTY_THRESHOLD.to_string(), json!(empty.to_string()));
            }
            if let Some(full) = update.full_threshold {
                values.insert(PREF_FULL_THRESHOLD.to_string(), json!(full.to_string()));
            }
            if let Some(home) = &update.home {
                apply_destination(values, Destination::Home, home);
            }
            if let Some(work) = &update.work {
                apply_destination(values, Destination::Work, work);
            }
        })?;
        Ok(())
    }
}

fn apply_destination(
    values: &mut PreferenceMap,
    destination: Destination,
    update: &DestinationUpdate,
) {
    let keys = destination_keys(destination);
    values.insert(keys.set.to_string(), json!(update.active));
    if let Some(latitude) = update.latitude {
        values.insert(keys.latitude.to_string(), json!(latitude.to_string()));
    }
    if let Some(longitude) = update.longitude {
        values.insert(keys.longitude.to_string(), json!(longitude.to_string()));
    }
}
