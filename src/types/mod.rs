//! Core types for telemetry data representation.
//!
//! The bridge sends one JSON object per tick mirroring the RaceRoom shared memory block.
//! This module provides the typed view over that object and the conventions for reading it:
//!
//! - [`Snapshot`] keeps the raw JSON next to the typed [`Shared`] view
//! - [`DriverData`] is one car's scoring record; index order is not rank
//! - [`Sentinel`] turns `-1` style "no data" markers into `Option`s
//! - [`SessionType`], [`SessionPhase`], [`PitState`] and [`ControlType`] decode integer codes
//! - [`PollRate`] controls how often the client asks for a new snapshot
//!
//! ## Usage Example
//!
//! ```rust
//! use racedash::types::{Sentinel, Snapshot};
//!
//! let snapshot = Snapshot::from_json(r#"{
//!     "VehicleInfo": { "SlotId": 4 },
//!     "LapTimeBestSelf": -1,
//!     "DriverData": [{ "DriverInfo": { "SlotId": 4 }, "Place": 2 }]
//! }"#).unwrap();
//!
//! assert_eq!(snapshot.player().map(|p| p.place), Some(2));
//! assert_eq!(snapshot.lap_time_best_self.known(), None);
//! ```

mod enums;
mod poll_rate;
mod sentinel;
mod snapshot;

pub use enums::{ControlType, PitState, SessionPhase, SessionType};
pub use poll_rate::PollRate;
pub use sentinel::{INVALID, INVALID_DELTA, INVALID_F64, Sentinel, known_delta};
pub use snapshot::{
    DriverData, DriverInfo, Orientation, ProtocolVersion, SHARED_MEMORY_VERSION_MAJOR,
    SHARED_MEMORY_VERSION_MINOR, Sectors, Shared, Snapshot, Vector3, lookup_path,
};
