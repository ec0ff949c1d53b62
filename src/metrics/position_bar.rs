//! Position bar: the row of opponents around the player with their gaps.

use std::cmp::Ordering;

use super::Engine;
use super::gaps::{
    Placement, absolute_race_gaps, distance_gap_text, qualify_gap_text, relative_distance_gap,
};
use crate::dispatch::UpdateContext;
use crate::format::{TimeFormat, format_lap_time, format_time};
use crate::types::{DriverData, PitState, Sentinel, SessionPhase, SessionType, Shared};

/// Drivers shown on each side of the player in relative mode.
const RELATIVE_SPAN: usize = 3;

/// Drivers shown before the player in absolute mode.
const ABSOLUTE_BEFORE: usize = 6;

/// Drivers shown from the player onwards in absolute mode.
const ABSOLUTE_FROM: usize = 7;

/// Ordering used by the bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BarMode {
    /// Race order with accumulated time gaps.
    #[default]
    Absolute,
    /// On-track order around the player with distance gaps.
    Relative,
}

/// Lap relation of an opponent to the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LapRelation {
    /// The opponent has completed fewer laps: the player is lapping them
    Lapping,
    #[default]
    SameLap,
    /// The opponent has completed more laps: the player is being lapped
    Lapped,
}

impl LapRelation {
    fn from_delta(lap_delta: i32) -> Self {
        match lap_delta.cmp(&0) {
            Ordering::Less => LapRelation::Lapping,
            Ordering::Equal => LapRelation::SameLap,
            Ordering::Greater => LapRelation::Lapped,
        }
    }
}

/// One entry of the bar.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverView {
    pub driver_id: i32,
    pub display_name: String,
    /// Position in class
    pub rank: i32,
    pub lap_delta: i32,
    pub gap_text: Option<String>,
    pub class_color: String,
    pub is_user: bool,
    pub lap_relation: LapRelation,
}

/// Session values shown next to the bar.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PositionBarHeader {
    pub session_type: SessionType,
    pub session_phase: SessionPhase,
    pub current_lap: Option<i32>,
    pub max_laps: Option<i32>,
    pub session_time_text: Option<String>,
    pub class_position: Option<i32>,
    pub class_driver_count: usize,
    /// Current lap time in non-race sessions, `-:--.---` when unavailable
    pub lap_time_text: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PositionBarView {
    pub visible: bool,
    pub drivers: Vec<DriverView>,
    /// Empty slots before the first driver so the player stays centred (absolute mode)
    pub leading_padding: usize,
    pub header: PositionBarHeader,
}

/// Computes the position bar in either mode.
#[derive(Debug, Clone, Default)]
pub struct PositionBarEngine {
    mode: BarMode,
}

impl PositionBarEngine {
    pub fn new(mode: BarMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> BarMode {
        self.mode
    }

    fn visible(&self, shared: &Shared) -> bool {
        if !shared.session_phase.has_reached(SessionPhase::Countdown) {
            return false;
        }

        match self.mode {
            BarMode::Absolute => true,
            BarMode::Relative => {
                shared.driver_data.len() > 1
                    && shared.pit_state != PitState::Pitting
                    && shared.session_type.is_race()
            }
        }
    }

    fn header(&self, shared: &Shared) -> PositionBarHeader {
        let class_driver_count =
            shared.driver_data.iter().filter(|d| shared.is_same_class(d)).count();

        PositionBarHeader {
            session_type: shared.session_type,
            session_phase: shared.session_phase,
            current_lap: shared.completed_laps.known().map(|laps| laps + 1),
            max_laps: shared.number_of_laps.known(),
            session_time_text: shared
                .session_time_remaining
                .known()
                .map(|remaining| format_time(remaining, TimeFormat::Hours, false)),
            class_position: shared.position_class.known(),
            class_driver_count,
            lap_time_text: shared
                .lap_time_current_self
                .known()
                .map(|t| format_time(t, TimeFormat::MinutesSeconds, false))
                .unwrap_or_else(|| "-:--.---".to_string()),
        }
    }
}

/// Gap text shown on the player's own entry.
///
/// Best lap outside races, running lap time in races, `-` when unavailable.
pub fn player_position_text(shared: &Shared) -> String {
    let time = if shared.session_type.is_race() {
        shared.lap_time_current_self
    } else {
        shared.sector_times_best_self.sector3
    };

    match time.known() {
        Some(time) => format_lap_time(time.max(0.0), false),
        None => "-".to_string(),
    }
}

/// Sorted-list indices of the tripled-list window of up to seven drivers centred on
/// `player_idx`.
///
/// Each driver appears at most once, in first-seen order, so short fields do not loop.
fn relative_window(n: usize, player_idx: usize) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }

    let start = player_idx + n;
    let from = start.saturating_sub(RELATIVE_SPAN);
    let to = (3 * n).min(start + RELATIVE_SPAN + 1);

    let mut seen = vec![false; n];
    (from..to).map(|i| i % n).filter(|&i| !std::mem::replace(&mut seen[i], true)).collect()
}

fn relative_gap_text(shared: &Shared, driver: &DriverData, placement: Placement) -> Option<String> {
    let player = shared.lap_distance.known()?;
    let opponent = driver.lap_distance.known()?;
    let track_length = shared.layout_length.known()?;
    Some(distance_gap_text(relative_distance_gap(player, opponent, track_length, placement)))
}

impl Engine for PositionBarEngine {
    type View = PositionBarView;

    fn name(&self) -> &'static str {
        match self.mode {
            BarMode::Absolute => "position_bar",
            BarMode::Relative => "relative",
        }
    }

    fn update(&mut self, cx: &UpdateContext<'_>) -> PositionBarView {
        let shared = cx.snapshot.data();
        let is_race = shared.session_type.is_race();

        let mut drivers: Vec<&DriverData> = shared
            .drivers_by_place()
            .into_iter()
            .filter(|d| is_race || shared.is_player(d) || d.best_lap().is_some())
            .collect();

        let (window, gaps, player_idx) = match self.mode {
            BarMode::Relative => {
                drivers.sort_by(|a, b| b.lap_distance.total_cmp(&a.lap_distance));
                let player_idx = drivers.iter().position(|d| shared.is_player(d)).unwrap_or(0);
                let indices = relative_window(drivers.len(), player_idx);

                // Placement follows the sort order, not the position inside the window
                let gaps = indices
                    .iter()
                    .map(|&i| {
                        let d = drivers[i];
                        if shared.is_player(d) {
                            None
                        } else if is_race {
                            let placement =
                                if i < player_idx { Placement::Ahead } else { Placement::Behind };
                            relative_gap_text(shared, d, placement)
                        } else {
                            qualify_gap_text(shared, d)
                        }
                    })
                    .collect::<Vec<_>>();
                let window: Vec<&DriverData> = indices.iter().map(|&i| drivers[i]).collect();
                let player_idx = window.iter().position(|d| shared.is_player(d)).unwrap_or(0);
                (window, gaps, player_idx)
            }
            BarMode::Absolute => {
                let gaps = if is_race {
                    absolute_race_gaps(shared, &drivers)
                } else {
                    drivers
                        .iter()
                        .map(|d| if shared.is_player(d) { None } else { qualify_gap_text(shared, d) })
                        .collect()
                };

                let player_idx = drivers.iter().position(|d| shared.is_player(d)).unwrap_or(0);
                let from = player_idx.saturating_sub(ABSOLUTE_BEFORE);
                let to = drivers.len().min(player_idx + ABSOLUTE_FROM);
                (drivers[from..to].to_vec(), gaps[from..to].to_vec(), player_idx - from)
            }
        };

        let entries = window
            .into_iter()
            .zip(gaps)
            .map(|(driver, gap_text)| {
                let is_user = shared.is_player(driver);
                let lap_delta = driver.completed_laps - shared.completed_laps;
                let class_index = driver.driver_info.class_performance_index;
                DriverView {
                    driver_id: driver.slot_id(),
                    display_name: driver.driver_info.display_name(),
                    rank: driver.place_class,
                    lap_delta,
                    gap_text: if is_user { Some(player_position_text(shared)) } else { gap_text },
                    class_color: cx.palette.color(class_index).to_string(),
                    is_user,
                    lap_relation: LapRelation::from_delta(lap_delta),
                }
            })
            .collect();

        let leading_padding = match self.mode {
            BarMode::Absolute => ABSOLUTE_BEFORE.saturating_sub(player_idx),
            BarMode::Relative => 0,
        };

        PositionBarView {
            visible: self.visible(shared),
            drivers: entries,
            leading_padding,
            header: self.header(shared),
        }
    }
}
