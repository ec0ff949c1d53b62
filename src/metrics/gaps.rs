//! Gap calculations between the player and opponents.
//!
//! All functions are pure; sentinels are checked before any arithmetic so a `-1` never ends
//! up inside a gap.

use crate::format::format_lap_time;
use crate::types::{DriverData, Sentinel, Shared};

/// Accumulated time gaps at or above this many seconds are shown as laps.
pub const LAP_TEXT_THRESHOLD: f64 = 120.0;

/// Where an opponent sits relative to the player in a display ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Ahead,
    Behind,
}

/// Text for a gap expressed in laps: `-1 lap`, `-3 laps`.
///
/// The sign is always `-` regardless of direction.
pub fn lap_gap_text(lap_diff: i32) -> String {
    let laps = lap_diff.unsigned_abs();
    let unit = if laps == 1 { "lap" } else { "laps" };
    format!("-{laps} {unit}")
}

/// Text for an accumulated race gap.
///
/// `accumulated` is the absolute time in seconds; drivers ahead get a `-` prefix, drivers
/// behind a `+`. At [`LAP_TEXT_THRESHOLD`] the text switches to a lap count.
pub fn race_gap_text(accumulated: f64, placement: Placement, lap_diff: i32) -> String {
    if accumulated >= LAP_TEXT_THRESHOLD {
        return lap_gap_text(lap_diff);
    }

    match placement {
        Placement::Ahead => format_lap_time(-accumulated, false),
        Placement::Behind => format_lap_time(accumulated, true),
    }
}

/// Race gap text for every driver in `drivers`, which must be ordered by place.
///
/// Drivers ahead of the player accumulate `TimeDeltaBehind` walking towards the leader;
/// drivers behind accumulate `TimeDeltaFront`. A sentinel delta breaks the chain: that
/// driver and every driver further away get no text. The player gets no text.
pub fn absolute_race_gaps(shared: &Shared, drivers: &[&DriverData]) -> Vec<Option<String>> {
    let mut gaps = vec![None; drivers.len()];
    let Some(player_idx) = drivers.iter().position(|d| shared.is_player(d)) else {
        return gaps;
    };
    let lap_diff = |driver: &DriverData| driver.completed_laps - shared.completed_laps;

    let mut accumulated = 0.0;
    for idx in (0..player_idx).rev() {
        let Some(delta) = drivers[idx].time_delta_behind.known() else {
            break;
        };
        accumulated += delta;
        gaps[idx] = Some(race_gap_text(accumulated, Placement::Ahead, lap_diff(drivers[idx])));
    }

    let mut accumulated = 0.0;
    for idx in player_idx + 1..drivers.len() {
        let Some(delta) = drivers[idx].time_delta_front.known() else {
            break;
        };
        accumulated += delta;
        gaps[idx] = Some(race_gap_text(accumulated, Placement::Behind, lap_diff(drivers[idx])));
    }

    gaps
}

/// Time to the nearest car ahead in the player's class.
///
/// Walks from the car directly ahead towards the leader summing `TimeDeltaBehind` until the
/// first same-class car. `None` when the player leads the class or a delta is unavailable.
pub fn class_time_delta_in_front(shared: &Shared) -> Option<f64> {
    let drivers = shared.drivers_by_place();
    let player_idx = drivers.iter().position(|d| shared.is_player(d))?;

    let mut accumulated = 0.0;
    for driver in drivers[..player_idx].iter().rev() {
        accumulated += driver.time_delta_behind.known()?;
        if shared.is_same_class(driver) {
            return Some(accumulated);
        }
    }
    None
}

/// Signed on-track distance from the player to an opponent, in meters.
///
/// Positive means the opponent is ahead on track. The naive difference is corrected by one
/// track length when the opponent's placement says it wrapped around start/finish relative
/// to the player.
pub fn relative_distance_gap(
    player_distance: f64,
    opponent_distance: f64,
    track_length: f64,
    placement: Placement,
) -> f64 {
    let naive = opponent_distance - player_distance;
    let half = track_length / 2.0;

    match placement {
        Placement::Behind if naive < -half => naive + track_length,
        Placement::Ahead if naive > half => naive - track_length,
        _ => naive,
    }
}

/// `+70m` / `-50m`, rounded to whole meters.
pub fn distance_gap_text(gap: f64) -> String {
    let meters = gap.round() as i64;
    if meters > 0 { format!("+{meters}m") } else { format!("{meters}m") }
}

/// Best-lap gap from the player to an opponent in non-race sessions.
///
/// `None` when either side has no best lap yet.
pub fn qualify_gap(shared: &Shared, opponent: &DriverData) -> Option<f64> {
    let player_best = shared.sector_times_best_self.sector3.known()?;
    let opponent_best = opponent.best_lap()?;
    Some(opponent_best - player_best)
}

/// Text form of [`qualify_gap`].
pub fn qualify_gap_text(shared: &Shared, opponent: &DriverData) -> Option<String> {
    qualify_gap(shared, opponent).map(|gap| format_lap_time(gap, true))
}
