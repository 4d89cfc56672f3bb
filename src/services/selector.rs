//! Picks the first station in a ranked list that can actually serve the user.
//!
//! A rider needs open docks, anyone else needs bikes. "Enough" means strictly
//! more than the user's full or empty threshold.

use serde::Serialize;
use utoipa::ToSchema;

use crate::services::action::Action;
use crate::services::ranking::StationDistance;

/// Ranks beyond this are reported as this value.
pub const MAX_LIMITED_RANK: usize = 3;

/// User thresholds: a station at or below one of these counts as empty or full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct Thresholds {
    pub empty: i32,
    pub full: i32,
}

/// What a station must offer to be selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Docks { more_than: i32 },
    Bikes { more_than: i32 },
}

impl Requirement {
    pub fn for_action(action: Action, thresholds: Thresholds) -> Self {
        match action {
            Action::Riding => Requirement::Docks {
                more_than: thresholds.full,
            },
            _ => Requirement::Bikes {
                more_than: thresholds.empty,
            },
        }
    }

    pub fn is_met(&self, distance: &StationDistance<'_>) -> bool {
        match *self {
            Requirement::Docks { more_than } => distance.station.available_docks > more_than,
            Requirement::Bikes { more_than } => distance.station.available_bikes > more_than,
        }
    }
}

/// The selected station and how many better-placed stations were skipped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedStationDistance<'a> {
    pub distance: StationDistance<'a>,
    /// Zero-based index in the ranked list.
    pub rank: usize,
    /// `rank` capped at `MAX_LIMITED_RANK`.
    pub limited_rank: usize,
}

/// First entry of `ordered` meeting `requirement`, or `None` if none does.
pub fn closest_available<'a>(
    ordered: &[StationDistance<'a>],
    requirement: Requirement,
) -> Option<RankedStationDistance<'a>> {
    ordered
        .iter()
        .enumerate()
        .find(|(_, distance)| requirement.is_met(distance))
        .map(|(rank, distance)| RankedStationDistance {
            distance: *distance,
            rank,
            limited_rank: rank.min(MAX_LIMITED_RANK),
        })
}
