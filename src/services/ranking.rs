//! Orders stations by how useful they are to reach right now.
//!
//! Two strategies exist:
//!
//! - `ByLocation`: plain distance from the current location.
//! - `ByDestination`: while riding towards a known destination, favours
//!   stations near the destination. Distance to the destination weighs four
//!   times as much as distance from the current location, on the rough
//!   assumption that walking is four times slower than riding.
//!
//! Nothing here is cached; every call re-measures and re-sorts the whole list.

use std::fmt;

use crate::helpers::{miles_to_feet, miles_to_kilometers, miles_to_meters};
use crate::services::action::Action;
use crate::services::geo::{CompassPoint, Coordinate};
use crate::store::models::Station;

/// Weight of the destination leg relative to the current-location leg.
pub const DESTINATION_WEIGHT: f64 = 4.0;

/// Below this many miles, distances are shown in feet.
const FEET_DISPLAY_THRESHOLD_MILES: f64 = 0.1;

/// How station distances are measured and ordered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RankingStrategy {
    ByLocation {
        origin: Coordinate,
    },
    ByDestination {
        origin: Coordinate,
        destination: Coordinate,
    },
}

impl RankingStrategy {
    /// Pick the strategy for the given action.
    ///
    /// Returns `None` when the current location is unknown: there is nothing
    /// to rank against, and no fallback location is assumed.
    pub fn select(
        action: Action,
        location: Option<Coordinate>,
        destination: Option<Coordinate>,
    ) -> Option<Self> {
        let origin = location?;
        match (action, destination) {
            (Action::Riding, Some(destination)) => Some(RankingStrategy::ByDestination {
                origin,
                destination,
            }),
            _ => Some(RankingStrategy::ByLocation { origin }),
        }
    }

    pub fn origin(&self) -> Coordinate {
        match self {
            RankingStrategy::ByLocation { origin } => *origin,
            RankingStrategy::ByDestination { origin, .. } => *origin,
        }
    }

    /// Measure a single station from the strategy's reference point(s).
    pub fn measure<'a>(&self, station: &'a Station) -> StationDistance<'a> {
        let origin = self.origin();
        let target = station.coordinate();
        let miles_to_destination = match self {
            RankingStrategy::ByLocation { .. } => None,
            RankingStrategy::ByDestination { destination, .. } => {
                Some(destination.miles_to(target))
            }
        };
        StationDistance {
            station,
            miles_to_location: origin.miles_to(target),
            direction: origin.bearing_to(target),
            miles_to_destination,
        }
    }
}

/// A station paired with its distance and bearing from the current location.
///
/// When measured for a destination, `miles_to_destination` is set and the
/// ordering key becomes the weighted sum of both legs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StationDistance<'a> {
    pub station: &'a Station,
    pub miles_to_location: f64,
    pub direction: CompassPoint,
    pub miles_to_destination: Option<f64>,
}

impl<'a> StationDistance<'a> {
    /// Ascending ordering key.
    pub fn sort_key(&self) -> f64 {
        match self.miles_to_destination {
            Some(to_destination) => DESTINATION_WEIGHT * to_destination + self.miles_to_location,
            None => self.miles_to_location,
        }
    }

    pub fn feet_to_location(&self) -> f64 {
        miles_to_feet(self.miles_to_location)
    }

    pub fn kilometers_to_location(&self) -> f64 {
        miles_to_kilometers(self.miles_to_location)
    }

    pub fn meters_to_location(&self) -> f64 {
        miles_to_meters(self.miles_to_location)
    }

    pub fn kilometers_to_destination(&self) -> Option<f64> {
        self.miles_to_destination.map(miles_to_kilometers)
    }

    pub fn meters_to_destination(&self) -> Option<f64> {
        self.miles_to_destination.map(miles_to_meters)
    }

    /// Short human-readable distance, e.g. `"420 Feet NE"` or `"1.27 Miles S"`.
    pub fn distance_label(&self) -> String {
        if self.miles_to_location < FEET_DISPLAY_THRESHOLD_MILES {
            format!("{} Feet {}", self.feet_to_location() as i64, self.direction)
        } else {
            format!("{:.2} Miles {}", self.miles_to_location, self.direction)
        }
    }
}

impl fmt::Display for StationDistance<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.station.station_name, self.distance_label())
    }
}

/// Stable ascending sort by each entry's ordering key.
pub fn sort_distances(distances: &mut [StationDistance<'_>]) {
    distances.sort_by(|a, b| a.sort_key().total_cmp(&b.sort_key()));
}

/// Measure every station with `strategy` and sort the result.
///
/// An absent strategy (unknown location) yields an empty list.
pub fn order_closest_stations(
    stations: &[Station],
    strategy: Option<RankingStrategy>,
) -> Vec<StationDistance<'_>> {
    let Some(strategy) = strategy else {
        return Vec::new();
    };
    let mut distances: Vec<StationDistance<'_>> =
        stations.iter().map(|s| strategy.measure(s)).collect();
    sort_distances(&mut distances);
    distances
}
