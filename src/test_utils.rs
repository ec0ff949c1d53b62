//! Snapshot builders for tests and benchmarks
//!
//! Builders produce the same JSON the bridge sends and decode it through
//! [`Snapshot::from_value`], so tests exercise the real decoding path. Every builder starts
//! from a running session: green flag, lights out, player on track, not in menus or replay.

#![cfg(any(test, feature = "benchmark"))]

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value, json};

use crate::types::{
    ControlType, PitState, SHARED_MEMORY_VERSION_MAJOR, SHARED_MEMORY_VERSION_MINOR, SessionPhase,
    SessionType, Snapshot,
};

fn sectors(values: [f64; 3]) -> Value {
    json!({ "Sector1": values[0], "Sector2": values[1], "Sector3": values[2] })
}

fn set_nested(fields: &mut Map<String, Value>, outer: &str, inner: &str, value: Value) {
    let entry = fields.entry(outer).or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(map) = entry {
        map.insert(inner.to_string(), value);
    }
}

/// Builds a full snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    fields: Map<String, Value>,
    drivers: Vec<Value>,
}

impl SnapshotBuilder {
    fn session(session_type: SessionType) -> Self {
        let base = json!({
            "VersionMajor": SHARED_MEMORY_VERSION_MAJOR,
            "VersionMinor": SHARED_MEMORY_VERSION_MINOR,
            "GamePaused": 0,
            "GameInMenus": 0,
            "GameInReplay": 0,
            "SessionType": session_type.code(),
            "SessionPhase": SessionPhase::Green.code(),
            "StartLights": 6,
            "PitState": PitState::None.code(),
            "InPitlane": 0,
            "TimeDeltaBestSelf": -1000.0,
        });
        let Value::Object(fields) = base else { unreachable!("literal object") };
        Self { fields, drivers: Vec::new() }
    }

    pub fn race() -> Self {
        Self::session(SessionType::Race)
    }

    pub fn qualify() -> Self {
        Self::session(SessionType::Qualify)
    }

    pub fn practice() -> Self {
        Self::session(SessionType::Practice)
    }

    fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn player_slot(mut self, slot: i32) -> Self {
        set_nested(&mut self.fields, "VehicleInfo", "SlotId", slot.into());
        self
    }

    pub fn player_class(mut self, class: i32) -> Self {
        set_nested(&mut self.fields, "VehicleInfo", "ClassPerformanceIndex", class.into());
        self
    }

    pub fn track(self, track: &str, layout: &str) -> Self {
        self.set("TrackName", track).set("LayoutName", layout)
    }

    pub fn completed_laps(self, laps: i32) -> Self {
        self.set("CompletedLaps", laps)
    }

    pub fn number_of_laps(self, laps: i32) -> Self {
        self.set("NumberOfLaps", laps)
    }

    pub fn session_time_remaining(self, seconds: f64) -> Self {
        self.set("SessionTimeRemaining", seconds)
    }

    pub fn position_class(self, place: i32) -> Self {
        self.set("PositionClass", place)
    }

    pub fn layout_length(self, meters: f64) -> Self {
        self.set("LayoutLength", meters)
    }

    pub fn lap_distance(self, meters: f64) -> Self {
        self.set("LapDistance", meters)
    }

    pub fn lap_fraction(self, fraction: f64) -> Self {
        self.set("LapDistanceFraction", fraction)
    }

    /// Personal best lap, both as lap time and as cumulative sector 3.
    pub fn best_lap(self, seconds: f64) -> Self {
        self.set("LapTimeBestSelf", seconds)
            .set("SectorTimesBestSelf", sectors([-1.0, -1.0, seconds]))
    }

    pub fn lap_time_current(self, seconds: f64) -> Self {
        self.set("LapTimeCurrentSelf", seconds)
    }

    pub fn delta_best(self, seconds: f64) -> Self {
        self.set("TimeDeltaBestSelf", seconds)
    }

    pub fn pit_state(self, state: PitState) -> Self {
        self.set("PitState", state.code())
    }

    pub fn phase(self, phase: SessionPhase) -> Self {
        self.set("SessionPhase", phase.code())
    }

    pub fn start_lights(self, lights: i32) -> Self {
        self.set("StartLights", lights)
    }

    pub fn speed_kph(self, kph: f64) -> Self {
        self.set("CarSpeed", kph / 3.6)
    }

    pub fn control(self, control: ControlType) -> Self {
        self.set("ControlType", control.code())
    }

    pub fn in_replay(self, replay: bool) -> Self {
        self.set("GameInReplay", i32::from(replay))
    }

    pub fn fuel(self, left: f64, capacity: f64, per_lap: f64) -> Self {
        self.set("FuelUseActive", 1)
            .set("FuelLeft", left)
            .set("FuelCapacity", capacity)
            .set("FuelPerLap", per_lap)
    }

    pub fn current_sectors(self, values: [f64; 3]) -> Self {
        self.set("SectorTimesCurrentSelf", sectors(values))
    }

    pub fn personal_best_sectors(self, values: [f64; 3]) -> Self {
        self.set("BestIndividualSectorTimeSelf", sectors(values))
    }

    pub fn class_best_sectors(self, values: [f64; 3]) -> Self {
        self.set("BestIndividualSectorTimeLeaderClass", sectors(values))
    }

    pub fn driver(mut self, driver: DriverBuilder) -> Self {
        self.drivers.push(driver.into_value());
        self
    }

    /// The JSON object the bridge would send.
    pub fn into_value(mut self) -> Value {
        self.fields.insert("NumCars".to_string(), self.drivers.len().into());
        self.fields.insert("DriverData".to_string(), Value::Array(self.drivers));
        Value::Object(self.fields)
    }

    pub fn to_json(&self) -> String {
        self.clone().into_value().to_string()
    }

    pub fn build(self) -> Snapshot {
        Snapshot::from_value(self.into_value()).expect("builder always produces a valid snapshot")
    }
}

/// Builds one `DriverData` entry.
#[derive(Debug, Clone)]
pub struct DriverBuilder {
    fields: Map<String, Value>,
}

impl DriverBuilder {
    /// A driver in slot `slot`, named "Driver {slot}".
    pub fn new(slot: i32) -> Self {
        let mut fields = Map::new();
        fields.insert("InPitlane".to_string(), 0.into());
        set_nested(&mut fields, "DriverInfo", "SlotId", slot.into());
        Self { fields }.name(&format!("Driver {slot}"))
    }

    fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Store `name` the way the bridge does: NUL padded and base64 encoded.
    pub fn name(mut self, name: &str) -> Self {
        let mut bytes = name.as_bytes().to_vec();
        bytes.resize(bytes.len().max(64), 0);
        set_nested(&mut self.fields, "DriverInfo", "Name", STANDARD.encode(bytes).into());
        self
    }

    pub fn class(mut self, class: i32) -> Self {
        set_nested(&mut self.fields, "DriverInfo", "ClassPerformanceIndex", class.into());
        self
    }

    pub fn place(self, place: i32) -> Self {
        self.set("Place", place)
    }

    pub fn place_class(self, place: i32) -> Self {
        self.set("PlaceClass", place)
    }

    pub fn laps(self, laps: i32) -> Self {
        self.set("CompletedLaps", laps)
    }

    pub fn delta_front(self, seconds: f64) -> Self {
        self.set("TimeDeltaFront", seconds)
    }

    pub fn delta_behind(self, seconds: f64) -> Self {
        self.set("TimeDeltaBehind", seconds)
    }

    pub fn lap_distance(self, meters: f64) -> Self {
        self.set("LapDistance", meters)
    }

    pub fn best_lap(self, seconds: f64) -> Self {
        self.set("SectorTimeBestSelf", sectors([-1.0, -1.0, seconds]))
    }

    pub fn in_pitlane(self, in_pitlane: bool) -> Self {
        self.set("InPitlane", i32::from(in_pitlane))
    }

    /// World position on the ground plane.
    pub fn position(self, x: f64, z: f64) -> Self {
        self.set("Position", json!({ "X": x, "Y": 0.0, "Z": z }))
    }

    fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

/// Install a test subscriber honouring `RUST_LOG`. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
