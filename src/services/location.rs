//! Last known device location.
//!
//! Reporters push locations in; the stored value may be old, so consumers
//! that care about freshness should look at its timestamp.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::errors::AppError;
use crate::helpers::parse_coordinate;
use crate::services::geo::Coordinate;
use crate::store::preferences::PreferenceStore;

pub(crate) const LATITUDE_KEY: &str = "LastLatitude";
pub(crate) const LONGITUDE_KEY: &str = "LastLongitude";
pub(crate) const TIMESTAMP_KEY: &str = "LastLocationTimestamp";

/// A location fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Location {
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// When the fix was taken
    pub recorded_at: DateTime<Utc>,
}

impl Location {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone)]
pub struct LocationManager {
    prefs: Arc<PreferenceStore>,
}

impl LocationManager {
    pub fn new(prefs: Arc<PreferenceStore>) -> Self {
        Self { prefs }
    }

    pub fn set_last_location(&self, location: &Location) -> Result<(), AppError> {
        if !location.latitude.is_finite() || !location.longitude.is_finite() {
            return Err(AppError::BadRequest(
                "Latitude and longitude must be finite".to_string(),
            ));
        }
        tracing::info!(
            "Storing location {} {}",
            location.latitude,
            location.longitude
        );
        self.prefs.edit(|values| {
            values.insert(
                LATITUDE_KEY.to_string(),
                json!(location.latitude.to_string()),
            );
            values.insert(
                LONGITUDE_KEY.to_string(),
                json!(location.longitude.to_string()),
            );
            values.insert(
                TIMESTAMP_KEY.to_string(),
                json!(location.recorded_at.timestamp_millis()),
            );
        })?;
        Ok(())
    }

    /// The last stored location, or `None` if none was ever stored or it no
    /// longer parses.
    pub fn last_location(&self) -> Option<Location> {
        if !self.prefs.contains(LATITUDE_KEY) || !self.prefs.contains(LONGITUDE_KEY) {
            return None;
        }
        let coordinate = parse_coordinate(
            "Last",
            self.prefs.get_string(LATITUDE_KEY).as_deref(),
            self.prefs.get_string(LONGITUDE_KEY).as_deref(),
        )?;
        let recorded_at =
            DateTime::from_timestamp_millis(self.prefs.get_i64(TIMESTAMP_KEY, 0))
                .unwrap_or_default();
        Some(Location {
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            recorded_at,
        })
    }
}
