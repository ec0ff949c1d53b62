//! Lap progress: delta trend, estimated lap time and position, sector marks.

use std::collections::VecDeque;

use super::Engine;
use super::gaps::class_time_delta_in_front;
use crate::dispatch::UpdateContext;
use crate::format::{TimeFormat, format_time};
use crate::types::{Sentinel, SessionType, Shared, known_delta};

/// Start lights value once the lights went green.
const GREEN_LIGHTS: i32 = 6;

/// Direction of the smoothed delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Trend {
    Gaining,
    #[default]
    Steady,
    Losing,
}

/// Smooths consecutive differences of a delta into an "improving" rate.
#[derive(Debug, Clone, Default)]
pub struct TrendTracker {
    history: VecDeque<f64>,
    last: Option<f64>,
    improving: f64,
}

impl TrendTracker {
    /// Differences kept for the moving mean.
    pub const HISTORY: usize = 10;
    /// Divisor applied when nudging `improving` towards the mean.
    pub const SMOOTHNESS: f64 = 100.0;
    /// Rate at which the trend bar is full, in seconds per tick.
    pub const MAX_IMPROVING: f64 = 0.003;
    /// Dead band around zero reported as steady.
    pub const STEADY_BAND: f64 = 0.001;

    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the delta of this tick. `None` breaks the difference chain.
    pub fn push(&mut self, current: Option<f64>) {
        if let (Some(last), Some(current)) = (self.last, current) {
            self.history.push_back(last - current);
            if self.history.len() > Self::HISTORY {
                self.history.pop_front();
                let mean = self.history.iter().sum::<f64>() / self.history.len() as f64;
                self.improving += (mean - self.improving) / Self::SMOOTHNESS;
            }
        }
        self.last = current;
    }

    /// Forget the history and the smoothed rate.
    pub fn reset(&mut self) {
        self.history.clear();
        self.last = None;
        self.improving = 0.0;
    }

    /// Positive while the delta shrinks.
    pub fn improving(&self) -> f64 {
        self.improving
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn trend(&self) -> Trend {
        if self.improving > Self::STEADY_BAND {
            Trend::Gaining
        } else if self.improving < -Self::STEADY_BAND {
            Trend::Losing
        } else {
            Trend::Steady
        }
    }

    /// Bar width in percent for `direction` 1 (gaining) or -1 (losing), capped at 50.
    pub fn bar_width(&self, direction: f64) -> f64 {
        (self.improving / Self::MAX_IMPROVING * direction * 50.0).min(50.0)
    }
}

/// Colour flags of one sector indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SectorMark {
    pub personal_best: bool,
    pub class_best: bool,
    pub inactive: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProgressView {
    pub visible: bool,
    pub session_type: SessionType,
    /// Delta to the class car ahead (race) or to the best lap (otherwise)
    pub current_difference: Option<f64>,
    pub delta_text: Option<String>,
    pub trend: Trend,
    pub improving: f64,
    pub gain_bar_width: f64,
    pub loss_bar_width: f64,
    pub estimated_lap_time: Option<f64>,
    pub estimated_lap_time_text: Option<String>,
    pub estimated_position: Option<i32>,
    pub estimated_delta_next: Option<f64>,
    pub sectors: [SectorMark; 3],
}

/// Tracks how the player's delta develops over the lap.
#[derive(Debug, Clone, Default)]
pub struct ProgressEngine {
    trend: TrendTracker,
    last_session: Option<SessionType>,
    last_fraction: Option<f64>,
    current_difference: Option<f64>,
    estimated_lap_time: Option<f64>,
    estimated_position: Option<i32>,
    estimated_delta_next: Option<f64>,
}

impl ProgressEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trend(&self) -> &TrendTracker {
        &self.trend
    }

    fn update_race(&mut self, shared: &Shared) {
        self.current_difference = class_time_delta_in_front(shared);
        self.trend.push(self.current_difference);
    }

    fn update_practice_qualify(&mut self, shared: &Shared) {
        if !shared.lap_time_current_self.is_known() {
            return;
        }
        let Some(delta) = known_delta(shared.time_delta_best_self) else {
            return;
        };
        if !shared.sector_times_best_self.sector3.is_known() {
            return;
        }

        self.current_difference = Some(delta);
        if let Some(best) = shared.lap_time_best_self.known() {
            self.estimate(shared, best + delta);
        }
        self.trend.push(Some(delta));
    }

    fn estimate(&mut self, shared: &Shared, estimate: f64) {
        let mut opponents: Vec<_> = shared
            .driver_data
            .iter()
            .filter(|d| shared.is_same_class(d) && d.place_class.is_known())
            .collect();
        opponents.sort_by_key(|d| d.place_class);

        let mut position = 1;
        let mut delta_next = 1.0;
        for opponent in opponents {
            let Some(best) = opponent.best_lap() else {
                continue;
            };
            if best > estimate || opponent.place_class >= shared.position_class {
                break;
            }
            delta_next = f64::min(1.0, estimate - best);
            position = opponent.place_class + 1;
        }

        self.estimated_lap_time = Some(estimate);
        self.estimated_position = Some(position);
        self.estimated_delta_next = Some(delta_next);
    }

    fn sector_marks(shared: &Shared) -> [SectorMark; 3] {
        let current = shared.sector_times_current_self.as_array();
        let personal = shared.best_individual_sector_time_self.as_array();
        let class = shared.best_individual_sector_time_leader_class.as_array();

        std::array::from_fn(|i| {
            let time = current[i].known();
            let beats = |best: f64| match (time, best.known()) {
                (Some(time), Some(best)) => time < best,
                _ => false,
            };
            SectorMark {
                personal_best: beats(personal[i]),
                class_best: beats(class[i]),
                inactive: time.is_none(),
            }
        })
    }
}

impl Engine for ProgressEngine {
    type View = ProgressView;

    fn name(&self) -> &'static str {
        "progress"
    }

    fn update(&mut self, cx: &UpdateContext<'_>) -> ProgressView {
        let shared = cx.snapshot.data();
        let is_race = shared.session_type.is_race();

        let session_changed = self.last_session.is_some_and(|t| t != shared.session_type);
        let fraction = shared.lap_distance_fraction.known();
        let wrapped = matches!(
            (self.last_fraction, fraction),
            (Some(previous), Some(current)) if previous - current > 0.5
        );
        if session_changed || wrapped {
            self.trend.reset();
        }
        self.last_session = Some(shared.session_type);
        self.last_fraction = fraction;

        if is_race {
            self.update_race(shared);
        } else {
            self.update_practice_qualify(shared);
        }

        let visible = !shared.pit_state.in_pits()
            && shared.start_lights >= GREEN_LIGHTS
            && self.current_difference.is_some()
            && (is_race || shared.lap_time_current_self.is_known());

        // Races show the gap to the car ahead as a negative number
        let delta_text = self.current_difference.map(|difference| {
            let shown = if is_race { -difference } else { difference };
            format_time(shown, TimeFormat::Seconds, true)
        });

        let improving = self.trend.improving();
        ProgressView {
            visible,
            session_type: shared.session_type,
            current_difference: self.current_difference,
            delta_text,
            trend: self.trend.trend(),
            improving,
            gain_bar_width: if improving > 0.0 { self.trend.bar_width(1.0) } else { 0.0 },
            loss_bar_width: if improving < 0.0 { self.trend.bar_width(-1.0) } else { 0.0 },
            estimated_lap_time: self.estimated_lap_time.filter(|_| !is_race),
            estimated_lap_time_text: self
                .estimated_lap_time
                .filter(|_| !is_race)
                .map(|t| format_time(t, TimeFormat::MinutesSeconds, false)),
            estimated_position: self.estimated_position.filter(|_| !is_race),
            estimated_delta_next: self.estimated_delta_next.filter(|_| !is_race),
            sectors: Self::sector_marks(shared),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ClassPalette;
    use crate::test_utils::{DriverBuilder, SnapshotBuilder};
    use crate::types::{PitState, Snapshot};
    use proptest::prelude::*;

    fn run(engine: &mut ProgressEngine, snapshot: &Snapshot) -> ProgressView {
        let palette = ClassPalette::new();
        engine.update(&UpdateContext { snapshot, palette: &palette })
    }

    #[test]
    fn trend_starts_after_history_overflows() {
        let mut tracker = TrendTracker::new();
        // Delta shrinking by 0.01 per tick
        for i in 0..11 {
            tracker.push(Some(1.0 - i as f64 * 0.01));
        }
        assert_eq!(tracker.history_len(), 10);
        assert_eq!(tracker.improving(), 0.0);

        tracker.push(Some(1.0 - 11.0 * 0.01));
        assert_eq!(tracker.history_len(), 10);
        assert!((tracker.improving() - 0.0001).abs() < 1e-9);
        assert!(tracker.improving() > 0.0);
    }

    #[test]
    fn missing_delta_never_enters_history() {
        let mut tracker = TrendTracker::new();
        tracker.push(Some(1.0));
        tracker.push(None);
        tracker.push(Some(0.5));
        assert_eq!(tracker.history_len(), 0);
    }

    #[test]
    fn trend_classification_and_bars() {
        let mut tracker = TrendTracker::new();
        tracker.improving = 0.0015;
        assert_eq!(tracker.trend(), Trend::Gaining);
        assert!((tracker.bar_width(1.0) - 25.0).abs() < 1e-9);

        tracker.improving = 0.01;
        assert_eq!(tracker.bar_width(1.0), 50.0);

        tracker.improving = -0.0005;
        assert_eq!(tracker.trend(), Trend::Steady);
    }

    #[test]
    fn estimate_walks_class_by_place() {
        let snapshot = SnapshotBuilder::qualify()
            .player_slot(9)
            .player_class(100)
            .position_class(4)
            .best_lap(92.0)
            .lap_time_current(30.0)
            .delta_best(-1.5)
            .driver(DriverBuilder::new(1).class(100).place_class(1).best_lap(89.0))
            .driver(DriverBuilder::new(2).class(100).place_class(2).best_lap(90.0))
            .driver(DriverBuilder::new(3).class(200).place_class(1).best_lap(80.0))
            .driver(DriverBuilder::new(4).class(100).place_class(3).best_lap(91.0))
            .driver(DriverBuilder::new(9).class(100).place_class(4).best_lap(92.0))
            .build();

        let view = run(&mut ProgressEngine::new(), &snapshot);
        assert_eq!(view.estimated_lap_time, Some(90.5));
        assert_eq!(view.estimated_position, Some(3));
        assert_eq!(view.estimated_delta_next, Some(0.5));
        assert_eq!(view.estimated_lap_time_text.as_deref(), Some("1:30.500"));
        assert_eq!(view.delta_text.as_deref(), Some("-1.500"));
        assert!(view.visible);
    }

    #[test]
    fn estimate_skips_opponents_without_time() {
        let snapshot = SnapshotBuilder::qualify()
            .player_slot(9)
            .player_class(100)
            .position_class(3)
            .best_lap(92.0)
            .lap_time_current(30.0)
            .delta_best(-5.0)
            .driver(DriverBuilder::new(1).class(100).place_class(1).best_lap(86.0))
            .driver(DriverBuilder::new(2).class(100).place_class(2))
            .driver(DriverBuilder::new(9).class(100).place_class(3).best_lap(92.0))
            .build();

        let view = run(&mut ProgressEngine::new(), &snapshot);
        assert_eq!(view.estimated_position, Some(2));
        assert_eq!(view.estimated_delta_next, Some(1.0));
    }

    #[test]
    fn no_reference_lap_keeps_view_hidden() {
        let snapshot = SnapshotBuilder::qualify()
            .player_slot(1)
            .lap_time_current(30.0)
            .driver(DriverBuilder::new(1))
            .build();

        let view = run(&mut ProgressEngine::new(), &snapshot);
        assert_eq!(view.current_difference, None);
        assert!(!view.visible);
    }

    #[test]
    fn race_uses_class_delta_in_front() {
        let snapshot = SnapshotBuilder::race()
            .player_slot(2)
            .driver(DriverBuilder::new(1).place(1).delta_behind(0.75))
            .driver(DriverBuilder::new(2).place(2))
            .build();

        let view = run(&mut ProgressEngine::new(), &snapshot);
        assert_eq!(view.current_difference, Some(0.75));
        assert_eq!(view.delta_text.as_deref(), Some("-0.750"));
        assert_eq!(view.estimated_position, None);
        assert!(view.visible);
    }

    #[test]
    fn hidden_in_pits_and_before_green() {
        let base = || {
            SnapshotBuilder::race()
                .player_slot(2)
                .driver(DriverBuilder::new(1).place(1).delta_behind(0.75))
                .driver(DriverBuilder::new(2).place(2))
        };

        let pits = base().pit_state(PitState::Pitting).build();
        assert!(!run(&mut ProgressEngine::new(), &pits).visible);

        let lights = base().start_lights(3).build();
        assert!(!run(&mut ProgressEngine::new(), &lights).visible);
    }

    #[test]
    fn lap_wrap_resets_history() {
        let mut engine = ProgressEngine::new();
        for i in 0..5 {
            let snapshot = SnapshotBuilder::qualify()
                .player_slot(1)
                .best_lap(90.0)
                .lap_time_current(10.0 + i as f64)
                .delta_best(0.1 * i as f64)
                .lap_fraction(0.8 + i as f64 * 0.01)
                .driver(DriverBuilder::new(1))
                .build();
            run(&mut engine, &snapshot);
        }
        assert_eq!(engine.trend().history_len(), 4);

        let next_lap = SnapshotBuilder::qualify()
            .player_slot(1)
            .best_lap(90.0)
            .lap_time_current(0.5)
            .delta_best(0.0)
            .lap_fraction(0.01)
            .driver(DriverBuilder::new(1))
            .build();
        run(&mut engine, &next_lap);
        assert_eq!(engine.trend().history_len(), 0);
    }

    #[test]
    fn sector_marks_compare_against_bests() {
        let snapshot = SnapshotBuilder::qualify()
            .player_slot(1)
            .current_sectors([20.0, 45.0, -1.0])
            .personal_best_sectors([21.0, 44.0, 70.0])
            .class_best_sectors([19.0, 46.0, 69.0])
            .driver(DriverBuilder::new(1))
            .build();

        let view = run(&mut ProgressEngine::new(), &snapshot);
        assert_eq!(view.sectors[0], SectorMark { personal_best: true, class_best: false, inactive: false });
        assert_eq!(view.sectors[1], SectorMark { personal_best: false, class_best: true, inactive: false });
        assert_eq!(view.sectors[2], SectorMark { personal_best: false, class_best: false, inactive: true });
    }

    proptest! {
        #[test]
        fn improving_stays_within_sample_range(samples in prop::collection::vec(-1.0f64..1.0, 12..60)) {
            let mut tracker = TrendTracker::new();
            for sample in &samples {
                tracker.push(Some(*sample));
            }
            // Differences of values in [-1, 1) lie in (-2, 2); a convex update cannot leave that
            prop_assert!(tracker.improving().abs() < 2.0);
            prop_assert!(tracker.history_len() <= TrendTracker::HISTORY);
        }
    }
}
