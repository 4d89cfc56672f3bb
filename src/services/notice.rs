//! The status notice shown for the selected station.

use serde::Serialize;
use utoipa::ToSchema;

use crate::services::action::Action;
use crate::services::selector::RankedStationDistance;

/// Vibration patterns in milliseconds, alternating delay and buzz.
pub const BUZZ_SILENT: &[u64] = &[0, 0];
pub const BUZZ_RANK_0: &[u64] = &[0, 200, 100, 200, 100, 200];
pub const BUZZ_RANK_1: &[u64] = &[0, 100, 150, 200, 150, 300, 150, 400];
pub const BUZZ_RANK_2: &[u64] = &[
    0, 100, 150, 200, 150, 300, 150, 400, //
    250, 100, 150, 200, 150, 300, 150, 400,
];
pub const BUZZ_RANK_3: &[u64] = &[
    0, 100, 150, 200, 150, 300, 150, 400, //
    250, 100, 150, 200, 150, 300, 150, 400, //
    250, 100, 150, 200, 150, 300, 150, 400,
];

/// Icons per rank: 0 = no bikes, 8 = no docks, 1..=7 = bike fill level.
const ICONS_PER_RANK: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum NoticePriority {
    Default,
    Max,
}

/// A rendered notice for the currently selected station.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct StationNotice {
    pub station_id: i64,
    pub title: String,
    pub text: String,
    /// Index into the 36 station icons
    pub icon_index: usize,
    pub priority: NoticePriority,
    /// Vibration pattern; absent when the notice should not vibrate at all
    pub vibration: Option<Vec<u64>>,
    pub rank: usize,
}

/// The parts of a previous selection used to decide whether to buzz again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionMemo {
    pub station_id: i64,
    pub available_bikes: i32,
    pub available_docks: i32,
}

impl SelectionMemo {
    pub fn of(selected: &RankedStationDistance<'_>) -> Self {
        let station = selected.distance.station;
        Self {
            station_id: station.id,
            available_bikes: station.available_bikes,
            available_docks: station.available_docks,
        }
    }
}

pub fn buzz_pattern(limited_rank: usize) -> &'static [u64] {
    match limited_rank {
        0 => BUZZ_RANK_0,
        1 => BUZZ_RANK_1,
        2 => BUZZ_RANK_2,
        _ => BUZZ_RANK_3,
    }
}

/// Icon for a station's fill level, offset by the capped rank.
pub fn icon_index(bikes: i32, docks: i32, limited_rank: usize) -> usize {
    let base = if bikes <= 0 {
        0
    } else if docks <= 0 {
        8
    } else {
        let level = (i64::from(bikes) * 7) / (i64::from(bikes) + i64::from(docks)) + 1;
        level.clamp(0, 8) as usize
    };
    base + limited_rank * ICONS_PER_RANK
}

/// Inputs to [`build_notice`] beyond the selection itself.
#[derive(Debug, Clone, Copy)]
pub struct NoticeContext<'a> {
    pub action: Action,
    pub destination_name: Option<&'a str>,
    pub vibration_enabled: bool,
    pub previous: Option<SelectionMemo>,
}

pub fn build_notice(
    selected: &RankedStationDistance<'_>,
    context: &NoticeContext<'_>,
) -> StationNotice {
    let station = selected.distance.station;
    let riding = context.action == Action::Riding;

    let mut text = String::new();
    if selected.rank > 0 {
        text.push_str(&format!("Rank: {}\n", selected.rank + 1));
    }
    if riding {
        text.push_str(&format!("Docks: {}", station.available_docks));
    } else {
        text.push_str(&format!(
            "Bikes: {} Duds: {}",
            station.available_bikes,
            station.duds()
        ));
    }
    text.push_str(&format!("\nGo: {}", selected.distance.distance_label()));

    let priority = match context.action {
        Action::Riding | Action::Searching => NoticePriority::Max,
        _ => NoticePriority::Default,
    };

    let vibration = match context.action {
        Action::Riding => {
            let changed = context.previous != Some(SelectionMemo::of(selected));
            let has_destination = context.destination_name.is_some();
            let pattern = if context.vibration_enabled && has_destination && changed {
                buzz_pattern(selected.limited_rank)
            } else {
                BUZZ_SILENT
            };
            Some(pattern.to_vec())
        }
        Action::Searching => Some(BUZZ_SILENT.to_vec()),
        _ => None,
    };

    StationNotice {
        station_id: station.id,
        title: station.station_name.clone(),
        text,
        icon_index: icon_index(
            station.available_bikes,
            station.available_docks,
            selected.limited_rank,
        ),
        priority,
        vibration,
        rank: selected.rank,
    }
}
