//! Proximity radar and side warnings.
//!
//! Positions are projected onto the ground plane as `x = -X, y = Z`. Bearings are measured
//! in degrees relative to the player's heading, with 90 on the right and 270 on the left.

use serde::{Deserialize, Serialize};

use super::Engine;
use crate::audio::{AudioCue, CuePlayer};
use crate::dispatch::UpdateContext;
use crate::types::{ControlType, Sentinel, Shared};

/// Bearing range (exclusive) of the left warning, degrees.
const LEFT_SECTOR: (f64, f64) = (215.0, 325.0);

/// Bearing range (exclusive) of the right warning, degrees.
const RIGHT_SECTOR: (f64, f64) = (35.0, 145.0);

/// Blips fade out completely at this distance.
const RADAR_FADE_DISTANCE: f64 = 14.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpottingConfig {
    /// Detection radius in meters
    pub radius: f64,
    /// Minimum player speed for a cue, km/h
    pub min_trigger_speed_kph: f64,
    /// Whether cues are played at all
    pub beep: bool,
}

impl Default for SpottingConfig {
    fn default() -> Self {
        Self { radius: 12.0, min_trigger_speed_kph: 30.0, beep: true }
    }
}

/// One car on the radar.
#[derive(Debug, Clone, PartialEq)]
pub struct RadarBlip {
    pub slot_id: i32,
    pub display_name: String,
    pub x: f64,
    pub y: f64,
    pub distance: f64,
    pub angle: f64,
    pub is_user: bool,
    pub class_color: String,
    pub opacity: f64,
}

/// Nearest car on one side.
#[derive(Debug, Clone, PartialEq)]
pub struct SideWarning {
    pub slot_id: i32,
    pub display_name: String,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpottingView {
    pub left: Option<SideWarning>,
    pub right: Option<SideWarning>,
    pub blips: Vec<RadarBlip>,
    /// Map rotation in radians
    pub rotation: f64,
    pub speed_kph: Option<f64>,
    /// Cue for this tick, present whenever a side is occupied at speed
    pub cue: Option<AudioCue>,
    /// Whether the cue may be played given the game state and settings
    pub should_play: bool,
}

/// Bearing of `(ox, oy)` seen from `(px, py)` for a player heading in degrees.
pub fn bearing(px: f64, py: f64, ox: f64, oy: f64, heading: f64) -> f64 {
    ((oy - py).atan2(ox - px).to_degrees() + heading + 360.0 + 90.0).rem_euclid(360.0)
}

/// Cue parameters for the nearest occupied side.
pub fn cue_for(closest: f64, radius: f64, left: bool, right: bool) -> AudioCue {
    let amount = 1.0 - closest / radius;
    let pan = match (left, right) {
        (true, false) => -1.0,
        (false, true) => 1.0,
        _ => 0.0,
    };
    AudioCue {
        volume: (amount * 0.1).clamp(0.0, 1.0),
        playback_rate: (amount * 2.0).clamp(0.1, 10.0),
        pan,
    }
}

fn in_sector(angle: f64, (min, max): (f64, f64)) -> bool {
    angle > min && angle < max
}

fn keep_nearest(slot: &mut Option<SideWarning>, blip: &RadarBlip) {
    if slot.as_ref().is_none_or(|current| blip.distance < current.distance) {
        *slot = Some(SideWarning {
            slot_id: blip.slot_id,
            display_name: blip.display_name.clone(),
            distance: blip.distance,
        });
    }
}

/// Detects cars alongside the player.
#[derive(Debug, Default)]
pub struct SpottingEngine {
    config: SpottingConfig,
    player: Option<CuePlayer>,
}

impl SpottingEngine {
    pub fn new(config: SpottingConfig) -> Self {
        Self { config, player: None }
    }

    /// Play cues through `player` when allowed.
    pub fn with_player(config: SpottingConfig, player: CuePlayer) -> Self {
        Self { config, player: Some(player) }
    }

    fn should_play(&self, shared: &Shared) -> bool {
        self.config.beep
            && shared.control_type == ControlType::Player
            && shared.game_in_menus == 0
            && shared.game_in_replay == 0
    }
}

impl Engine for SpottingEngine {
    type View = SpottingView;

    fn name(&self) -> &'static str {
        "spotting"
    }

    fn update(&mut self, cx: &UpdateContext<'_>) -> SpottingView {
        let shared = cx.snapshot.data();
        let px = -shared.car_cg_location.x;
        let py = shared.car_cg_location.z;
        let heading = (-shared.car_orientation.yaw).to_degrees();

        let mut view = SpottingView {
            rotation: -shared.car_orientation.yaw,
            speed_kph: shared.speed_kph(),
            ..SpottingView::default()
        };

        for driver in shared.driver_data.iter().filter(|d| d.slot_id().is_known()) {
            let ox = -driver.position.x;
            let oy = driver.position.z;
            let distance = (ox - px).hypot(oy - py);
            if distance >= self.config.radius {
                continue;
            }

            let blip = RadarBlip {
                slot_id: driver.slot_id(),
                display_name: driver.driver_info.display_name(),
                x: ox,
                y: oy,
                distance,
                angle: bearing(px, py, ox, oy, heading),
                is_user: shared.is_player(driver),
                class_color: cx.palette.color(driver.driver_info.class_performance_index).to_string(),
                opacity: 1.0 - (distance / RADAR_FADE_DISTANCE).min(1.0),
            };

            if !blip.is_user {
                if in_sector(blip.angle, LEFT_SECTOR) {
                    keep_nearest(&mut view.left, &blip);
                }
                if in_sector(blip.angle, RIGHT_SECTOR) {
                    keep_nearest(&mut view.right, &blip);
                }
            }
            view.blips.push(blip);
        }

        let fast_enough = view.speed_kph.is_some_and(|kph| kph > self.config.min_trigger_speed_kph);
        let closest = view
            .left
            .iter()
            .chain(view.right.iter())
            .map(|w| w.distance)
            .min_by(f64::total_cmp);

        if let (Some(closest), true) = (closest, fast_enough) {
            let cue = cue_for(closest, self.config.radius, view.left.is_some(), view.right.is_some());
            view.cue = Some(cue);
            view.should_play = self.should_play(shared);
            if let Some(player) = self.player.as_ref().filter(|_| view.should_play) {
                player.trigger(cue);
            }
        }

        view
    }
}
