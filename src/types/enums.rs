//! Integer-coded enumerations from the shared memory layout
//!
//! The bridge serialises these as plain integers. Each type converts from `i32` and keeps
//! unrecognised codes in an `Other` variant so newer game builds never fail to decode.

use serde::{Deserialize, Serialize};

macro_rules! coded_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident = $code:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "i32", into = "i32")]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
            /// Code not known to this build
            Other(i32),
        }

        impl From<i32> for $name {
            fn from(code: i32) -> Self {
                match code {
                    $($code => $name::$variant,)+
                    other => $name::Other(other),
                }
            }
        }

        impl From<$name> for i32 {
            fn from(value: $name) -> i32 {
                match value {
                    $($name::$variant => $code,)+
                    $name::Other(other) => other,
                }
            }
        }

        impl $name {
            /// Raw integer code as sent by the bridge.
            pub fn code(self) -> i32 {
                self.into()
            }
        }
    };
}

coded_enum! {
    /// Which session the player is in.
    SessionType {
        Unavailable = -1,
        Practice = 0,
        Qualify = 1,
        Race = 2,
        Warmup = 3,
    }
}

coded_enum! {
    /// Phase of the current session. Codes are ordered chronologically.
    SessionPhase {
        Unavailable = -1,
        /// Currently in garage
        Garage = 1,
        /// Gridwalk or track walkthrough
        Gridwalk = 2,
        /// Formation lap, rolling start etc.
        Formation = 3,
        /// Countdown to race is ongoing
        Countdown = 4,
        /// Race is ongoing
        Green = 5,
        /// End of session
        Checkered = 6,
    }
}

coded_enum! {
    /// Player pit state.
    PitState {
        Unavailable = -1,
        None = 0,
        RequestedStop = 1,
        Entered = 2,
        Pitting = 3,
        Exiting = 4,
    }
}

coded_enum! {
    /// Who is controlling the player's car.
    ControlType {
        Unavailable = -1,
        Player = 0,
        Ai = 1,
        Remote = 2,
        Replay = 3,
    }
}

impl Default for SessionType {
    fn default() -> Self {
        SessionType::Unavailable
    }
}

impl Default for SessionPhase {
    fn default() -> Self {
        SessionPhase::Unavailable
    }
}

impl Default for PitState {
    fn default() -> Self {
        PitState::Unavailable
    }
}

impl Default for ControlType {
    fn default() -> Self {
        ControlType::Unavailable
    }
}

impl SessionType {
    /// Returns `true` for race sessions.
    pub fn is_race(self) -> bool {
        self == SessionType::Race
    }
}

impl SessionPhase {
    /// Returns `true` once the session has at least reached the given phase.
    ///
    /// `Unavailable` is never considered to have reached any phase.
    pub fn has_reached(self, phase: SessionPhase) -> bool {
        self != SessionPhase::Unavailable && self.code() >= phase.code()
    }
}

impl PitState {
    /// Returns `true` while the car is inside the pit lane heading for or at its box.
    pub fn in_pits(self) -> bool {
        self.code() >= PitState::Entered.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_json() {
        let phase: SessionPhase = serde_json::from_str("5").unwrap();
        assert_eq!(phase, SessionPhase::Green);
        assert_eq!(serde_json::to_string(&phase).unwrap(), "5");

        let unknown: SessionType = serde_json::from_str("9").unwrap();
        assert_eq!(unknown, SessionType::Other(9));
        assert_eq!(unknown.code(), 9);
    }

    #[test]
    fn phase_ordering() {
        assert!(SessionPhase::Green.has_reached(SessionPhase::Countdown));
        assert!(!SessionPhase::Gridwalk.has_reached(SessionPhase::Countdown));
        assert!(!SessionPhase::Unavailable.has_reached(SessionPhase::Garage));
    }

    #[test]
    fn pit_states() {
        assert!(PitState::Pitting.in_pits());
        assert!(PitState::Exiting.in_pits());
        assert!(!PitState::RequestedStop.in_pits());
        assert!(!PitState::Unavailable.in_pits());
    }
}
