//! Telemetry snapshot: one fully-replacing record per simulation tick

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ops::Deref;

use super::enums::{ControlType, PitState, SessionPhase, SessionType};
use super::sentinel::{INVALID, INVALID_DELTA, INVALID_F64, Sentinel};
use crate::format;
use crate::{Result, TelemetryError};

/// Shared memory major version this build was written against.
pub const SHARED_MEMORY_VERSION_MAJOR: i32 = 2;

/// Shared memory minor version this build was written against.
pub const SHARED_MEMORY_VERSION_MINOR: i32 = 11;

/// Protocol version pair carried by every snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: i32,
    pub minor: i32,
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self { major: SHARED_MEMORY_VERSION_MAJOR, minor: SHARED_MEMORY_VERSION_MINOR }
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// World-space vector (Y = up).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Car body orientation in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Orientation {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

/// Cumulative sector times in seconds. `-1` means no time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Sectors {
    pub sector1: f64,
    pub sector2: f64,
    pub sector3: f64,
}

impl Default for Sectors {
    fn default() -> Self {
        Self { sector1: INVALID_F64, sector2: INVALID_F64, sector3: INVALID_F64 }
    }
}

impl Sectors {
    /// Sector values in track order.
    pub fn as_array(&self) -> [f64; 3] {
        [self.sector1, self.sector2, self.sector3]
    }
}

/// Static per-car identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DriverInfo {
    /// Base64 encoded, NUL padded UTF-8 name
    pub name: String,
    pub car_number: i32,
    pub class_id: i32,
    pub model_id: i32,
    pub team_id: i32,
    pub user_id: i32,
    pub slot_id: i32,
    pub class_performance_index: i32,
}

impl Default for DriverInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
            car_number: INVALID,
            class_id: INVALID,
            model_id: INVALID,
            team_id: INVALID,
            user_id: INVALID,
            slot_id: INVALID,
            class_performance_index: INVALID,
        }
    }
}

impl DriverInfo {
    /// Decoded, human readable driver name.
    pub fn display_name(&self) -> String {
        format::decode_name(&self.name)
    }
}

/// Scoring and position record for one car.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DriverData {
    pub driver_info: DriverInfo,
    pub finish_status: i32,
    pub place: i32,
    pub place_class: i32,
    /// Meters travelled on the current lap
    pub lap_distance: f64,
    pub position: Vector3,
    pub track_sector: i32,
    pub completed_laps: i32,
    pub current_lap_valid: i32,
    pub lap_time_current_self: f64,
    pub sector_time_best_self: Sectors,
    /// Seconds to the car placed in front
    pub time_delta_front: f64,
    /// Seconds to the car placed behind
    pub time_delta_behind: f64,
    pub in_pitlane: i32,
    pub num_pitstops: i32,
    /// Meters per second
    pub car_speed: f64,
}

impl Default for DriverData {
    fn default() -> Self {
        Self {
            driver_info: DriverInfo::default(),
            finish_status: INVALID,
            place: INVALID,
            place_class: INVALID,
            lap_distance: INVALID_F64,
            position: Vector3::default(),
            track_sector: INVALID,
            completed_laps: INVALID,
            current_lap_valid: INVALID,
            lap_time_current_self: INVALID_F64,
            sector_time_best_self: Sectors::default(),
            time_delta_front: INVALID_F64,
            time_delta_behind: INVALID_F64,
            in_pitlane: INVALID,
            num_pitstops: INVALID,
            car_speed: INVALID_F64,
        }
    }
}

impl DriverData {
    /// Slot identifier, unique per car in the session.
    pub fn slot_id(&self) -> i32 {
        self.driver_info.slot_id
    }

    /// Best lap time as recorded by the cumulative sector 3 time.
    pub fn best_lap(&self) -> Option<f64> {
        self.sector_time_best_self.sector3.known()
    }
}

/// Typed view of the shared memory block.
///
/// Only the fields used by the derived metrics are modelled; everything else stays
/// available through [`Snapshot::lookup`]. Missing fields decode to their sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Shared {
    pub version_major: i32,
    pub version_minor: i32,

    pub game_paused: i32,
    pub game_in_menus: i32,
    pub game_in_replay: i32,

    pub track_name: String,
    pub layout_name: String,
    /// Layout length in meters
    pub layout_length: f64,
    pub session_type: SessionType,
    pub session_phase: SessionPhase,
    /// -1 = unavailable, 0 = off, 1-5 = red lights counting down, 6 = green
    pub start_lights: i32,
    pub number_of_laps: i32,
    pub session_time_remaining: f64,

    pub pit_state: PitState,
    pub in_pitlane: i32,

    pub position: i32,
    pub position_class: i32,
    pub completed_laps: i32,
    pub lap_distance: f64,
    pub lap_distance_fraction: f64,
    pub lap_time_best_self: f64,
    pub sector_times_best_self: Sectors,
    pub lap_time_current_self: f64,
    pub sector_times_current_self: Sectors,
    pub best_individual_sector_time_self: Sectors,
    pub best_individual_sector_time_leader_class: Sectors,
    pub time_delta_front: f64,
    pub time_delta_behind: f64,
    /// Delta to the player's best lap; `-1000` when unavailable
    pub time_delta_best_self: f64,

    pub vehicle_info: DriverInfo,
    pub control_type: ControlType,
    /// Meters per second
    pub car_speed: f64,
    pub car_cg_location: Vector3,
    pub car_orientation: Orientation,

    pub fuel_left: f64,
    pub fuel_capacity: f64,
    pub fuel_per_lap: f64,
    pub fuel_use_active: i32,

    pub num_cars: i32,
    pub driver_data: Vec<DriverData>,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            version_major: INVALID,
            version_minor: INVALID,
            game_paused: INVALID,
            game_in_menus: INVALID,
            game_in_replay: INVALID,
            track_name: String::new(),
            layout_name: String::new(),
            layout_length: INVALID_F64,
            session_type: SessionType::Unavailable,
            session_phase: SessionPhase::Unavailable,
            start_lights: INVALID,
            number_of_laps: INVALID,
            session_time_remaining: INVALID_F64,
            pit_state: PitState::Unavailable,
            in_pitlane: INVALID,
            position: INVALID,
            position_class: INVALID,
            completed_laps: INVALID,
            lap_distance: INVALID_F64,
            lap_distance_fraction: INVALID_F64,
            lap_time_best_self: INVALID_F64,
            sector_times_best_self: Sectors::default(),
            lap_time_current_self: INVALID_F64,
            sector_times_current_self: Sectors::default(),
            best_individual_sector_time_self: Sectors::default(),
            best_individual_sector_time_leader_class: Sectors::default(),
            time_delta_front: INVALID_F64,
            time_delta_behind: INVALID_F64,
            time_delta_best_self: INVALID_DELTA,
            vehicle_info: DriverInfo::default(),
            control_type: ControlType::Unavailable,
            car_speed: INVALID_F64,
            car_cg_location: Vector3::default(),
            car_orientation: Orientation::default(),
            fuel_left: INVALID_F64,
            fuel_capacity: INVALID_F64,
            fuel_per_lap: INVALID_F64,
            fuel_use_active: INVALID,
            num_cars: INVALID,
            driver_data: Vec::new(),
        }
    }
}

impl Shared {
    /// Returns `true` when the record belongs to the local player.
    pub fn is_player(&self, driver: &DriverData) -> bool {
        self.vehicle_info.slot_id.is_known() && driver.slot_id() == self.vehicle_info.slot_id
    }

    /// The player's own entry, if the player is represented yet.
    pub fn player(&self) -> Option<&DriverData> {
        self.driver_data.iter().find(|driver| self.is_player(driver))
    }

    /// Returns `true` when the car races in the player's class.
    pub fn is_same_class(&self, driver: &DriverData) -> bool {
        driver.driver_info.class_performance_index == self.vehicle_info.class_performance_index
    }

    /// Drivers ordered by overall place. Entries without a place sort last, in source order.
    pub fn drivers_by_place(&self) -> Vec<&DriverData> {
        let mut drivers: Vec<&DriverData> = self.driver_data.iter().collect();
        drivers.sort_by_key(|driver| driver.place.known().unwrap_or(i32::MAX));
        drivers
    }

    /// Player speed in km/h, `None` when unavailable.
    pub fn speed_kph(&self) -> Option<f64> {
        self.car_speed.known().map(format::mps_to_kph)
    }

    /// Protocol version announced by the bridge.
    pub fn version(&self) -> ProtocolVersion {
        ProtocolVersion { major: self.version_major, minor: self.version_minor }
    }
}

/// One decoded telemetry tick.
///
/// Keeps the exact JSON object alongside the typed view so dumps and overrides
/// reproduce the original payload byte for byte in meaning.
#[derive(Debug, Clone)]
pub struct Snapshot {
    raw: Value,
    data: Shared,
}

impl Snapshot {
    /// Decode a snapshot from its JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let raw: Value = serde_json::from_str(text)?;
        Self::from_value(raw)
    }

    /// Decode a snapshot from an already parsed JSON value.
    ///
    /// The value must be an object carrying a `DriverData` array.
    pub fn from_value(raw: Value) -> Result<Self> {
        let object = raw
            .as_object()
            .ok_or_else(|| TelemetryError::decode("snapshot", "payload is not a JSON object"))?;

        match object.get("DriverData") {
            Some(Value::Array(_)) => {}
            Some(_) => {
                return Err(TelemetryError::decode("snapshot", "DriverData is not an array"));
            }
            None => return Err(TelemetryError::FieldNotFound { field: "DriverData".to_string() }),
        }

        let data = Shared::deserialize(&raw)
            .map_err(|e| TelemetryError::decode("snapshot", e.to_string()))?;

        Ok(Self { raw, data })
    }

    /// The exact JSON object received.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Typed view of the snapshot.
    pub fn data(&self) -> &Shared {
        &self.data
    }

    /// Serialise back to JSON text.
    pub fn to_json(&self) -> String {
        self.raw.to_string()
    }

    /// Look up a value by dotted path, e.g. `TireTemp.FrontLeft.CurrentTemp.Center`.
    ///
    /// Numeric segments index into arrays.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.raw, path)
    }
}

impl Deref for Snapshot {
    type Target = Shared;

    fn deref(&self) -> &Shared {
        &self.data
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

/// Resolve a dotted path inside a JSON value.
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }

    path.split('.').try_fold(root, |value, segment| match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}
