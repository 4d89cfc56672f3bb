//! Shared helpers for reading stored preference strings and converting units.
//!
//! Preference values are stored as user-entered strings. Parsing never fails
//! outward:
//!
//! - `parse_threshold`: falls back to 0 (a threshold of "more than zero")
//! - `parse_coordinate`: falls back to `None` (destination treated as unset)
//!
//! Both log a warning when they fall back on a value that was present.

use crate::services::geo::Coordinate;

const FEET_PER_MILE: f64 = 5280.0;
const KILOMETERS_PER_MILE: f64 = 1.609344;
const METERS_PER_MILE: f64 = 1609.344;

/// Parse a stored threshold value, defaulting to 0.
pub(crate) fn parse_threshold(key: &str, raw: Option<&str>) -> i32 {
    let Some(raw) = raw else {
        return 0;
    };
    raw.trim().parse().unwrap_or_else(|_| {
        tracing::warn!("Failed to parse threshold key {} value '{}'", key, raw);
        0
    })
}

/// Parse a stored latitude/longitude pair into a coordinate.
///
/// Returns `None` if either half is missing, unparseable or not finite.
pub(crate) fn parse_coordinate(
    name: &str,
    latitude: Option<&str>,
    longitude: Option<&str>,
) -> Option<Coordinate> {
    let (latitude, longitude) = (latitude?, longitude?);
    match (
        latitude.trim().parse::<f64>(),
        longitude.trim().parse::<f64>(),
    ) {
        (Ok(lat), Ok(lon)) if lat.is_finite() && lon.is_finite() => {
            Some(Coordinate::new(lat, lon))
        }
        _ => {
            tracing::warn!(
                "{} location extraction failed for '{}', '{}'",
                name,
                latitude,
                longitude
            );
            None
        }
    }
}

pub(crate) fn miles_to_feet(miles: f64) -> f64 {
    miles * FEET_PER_MILE
}

pub(crate) fn miles_to_kilometers(miles: f64) -> f64 {
    miles * KILOMETERS_PER_MILE
}

pub(crate) fn miles_to_meters(miles: f64) -> f64 {
    miles * METERS_PER_MILE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_threshold_normal() {
        assert_eq!(parse_threshold("pref_full_threshold", Some("3")), 3);
        assert_eq!(parse_threshold("pref_full_threshold", Some(" 12 ")), 12);
    }

    #[test]
    fn test_parse_threshold_missing() {
        assert_eq!(parse_threshold("pref_full_threshold", None), 0);
    }

    #[test]
    fn test_parse_threshold_garbage() {
        assert_eq!(parse_threshold("pref_empty_threshold", Some("lots")), 0);
        assert_eq!(parse_threshold("pref_empty_threshold", Some("")), 0);
        assert_eq!(parse_threshold("pref_empty_threshold", Some("2.5")), 0);
    }

    #[test]
    fn test_parse_coordinate_normal() {
        let c = parse_coordinate("Home", Some("40.7417806"), Some("-74.0045012")).unwrap();
        assert!((c.latitude - 40.7417806).abs() < 1e-10);
        assert!((c.longitude + 74.0045012).abs() < 1e-10);
    }

    #[test]
    fn test_parse_coordinate_missing_half() {
        assert_eq!(parse_coordinate("Home", Some("40.0"), None), None);
        assert_eq!(parse_coordinate("Home", None, Some("-74.0")), None);
    }

    #[test]
    fn test_parse_coordinate_garbage() {
        assert_eq!(parse_coordinate("Work", Some(""), Some("")), None);
        assert_eq!(parse_coordinate("Work", Some("north"), Some("-74.0")), None);
        assert_eq!(parse_coordinate("Work", Some("NaN"), Some("-74.0")), None);
    }

    #[test]
    fn test_unit_conversions() {
        assert_eq!(miles_to_feet(0.5), 2640.0);
        assert!((miles_to_kilometers(1.0) - 1.609344).abs() < 1e-12);
        assert!((miles_to_meters(2.0) - 3218.688).abs() < 1e-9);
    }
}
