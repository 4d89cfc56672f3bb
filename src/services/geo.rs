//! Great-circle distance and compass bearing between two points.
//!
//! The low-level functions take radians; `Coordinate` holds decimal degrees
//! and converts on the way in.

use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Statute miles per degree of arc (60 nautical miles × 1.1515).
const MILES_PER_DEGREE: f64 = 60.0 * 1.1515;

/// A WGS84 point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Coordinate {
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    fn to_radians(self) -> (f64, f64) {
        (self.latitude.to_radians(), self.longitude.to_radians())
    }

    /// Distance in statute miles from `self` to `other`.
    pub fn miles_to(self, other: Coordinate) -> f64 {
        let (lat1, lon1) = self.to_radians();
        let (lat2, lon2) = other.to_radians();
        distance_in_miles(lat1, lon1, lat2, lon2)
    }

    /// Compass direction of travel from `self` towards `other`.
    pub fn bearing_to(self, other: Coordinate) -> CompassPoint {
        let (lat1, lon1) = self.to_radians();
        let (lat2, lon2) = other.to_radians();
        compass_direction(lat1, lon1, lat2, lon2)
    }
}

/// Spherical law of cosines, in statute miles. Inputs are radians.
pub fn distance_in_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    // Rounding can push the cosine a hair past ±1 for (near-)identical points.
    let cosine = (lat1.sin() * lat2.sin() + lat1.cos() * lat2.cos() * (lon2 - lon1).cos())
        .clamp(-1.0, 1.0);
    cosine.acos().to_degrees() * MILES_PER_DEGREE
}

/// Initial bearing from point 1 to point 2, snapped to the 16-point compass.
/// Inputs are radians.
pub fn compass_direction(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> CompassPoint {
    let theta = lon2 - lon1;
    let dy = theta.sin() * lat2.cos();
    let dx = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * theta.cos();

    // atan2 spans -8..8 ticks; +16.5 is a full turn plus half a tick so that
    // truncation rounds to the nearest point.
    let tick = ((dy.atan2(dx) * 8.0 / PI) + 16.5) % 16.0;
    CompassPoint::from_index(tick as usize)
}

/// The sixteen points of the compass, clockwise from north.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum CompassPoint {
    N,
    Nne,
    Ne,
    Ene,
    E,
    Ese,
    Se,
    Sse,
    S,
    Ssw,
    Sw,
    Wsw,
    W,
    Wnw,
    Nw,
    Nnw,
}

impl CompassPoint {
    pub const ALL: [CompassPoint; 16] = [
        CompassPoint::N,
        CompassPoint::Nne,
        CompassPoint::Ne,
        CompassPoint::Ene,
        CompassPoint::E,
        CompassPoint::Ese,
        CompassPoint::Se,
        CompassPoint::Sse,
        CompassPoint::S,
        CompassPoint::Ssw,
        CompassPoint::Sw,
        CompassPoint::Wsw,
        CompassPoint::W,
        CompassPoint::Wnw,
        CompassPoint::Nw,
        CompassPoint::Nnw,
    ];

    /// Point at `index` (0 = N), wrapping past 15.
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index % 16]
    }

    pub fn label(self) -> &'static str {
        match self {
            CompassPoint::N => "N",
            CompassPoint::Nne => "NNE",
            CompassPoint::Ne => "NE",
            CompassPoint::Ene => "ENE",
            CompassPoint::E => "E",
            CompassPoint::Ese => "ESE",
            CompassPoint::Se => "SE",
            CompassPoint::Sse => "SSE",
            CompassPoint::S => "S",
            CompassPoint::Ssw => "SSW",
            CompassPoint::Sw => "SW",
            CompassPoint::Wsw => "WSW",
            CompassPoint::W => "W",
            CompassPoint::Wnw => "WNW",
            CompassPoint::Nw => "NW",
            CompassPoint::Nnw => "NNW",
        }
    }
}

impl fmt::Display for CompassPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
