use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::services::geo::Coordinate;

/// A single bike-share station as reported by the upstream feed.
///
/// Never mutated once deserialized; a new snapshot replaces the old one wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    pub id: i64,
    pub station_name: String,
    pub available_docks: i32,
    pub total_docks: i32,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub status_value: Option<String>,
    #[serde(default)]
    pub status_key: Option<i32>,
    pub available_bikes: i32,
    #[serde(default)]
    pub st_address1: Option<String>,
    #[serde(default)]
    pub st_address2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub altitude: Option<String>,
    #[serde(default)]
    pub test_station: bool,
    #[serde(default)]
    pub last_communication_time: Option<String>,
    #[serde(default)]
    pub land_mark: Option<String>,
}

impl Station {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    /// Docks that hold neither an available bike nor an open slot.
    pub fn duds(&self) -> i32 {
        self.total_docks - (self.available_docks + self.available_bikes)
    }
}

/// The full station list from one successful feed fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StationSnapshot {
    #[serde(default)]
    pub execution_time: Option<String>,
    #[serde(default)]
    pub station_bean_list: Vec<Station>,
    /// When this snapshot was retrieved. Not part of the upstream schema.
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    #[schema(value_type = Option<i64>)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl StationSnapshot {
    pub fn stations(&self) -> &[Station] {
        &self.station_bean_list
    }

    pub fn len(&self) -> usize {
        self.station_bean_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.station_bean_list.is_empty()
    }
}
