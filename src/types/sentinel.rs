//! "No data" sentinel handling
//!
//! The shared memory bridge never omits numeric fields. Instead it writes `-1` (or `-1000`
//! for `TimeDeltaBestSelf`) when a value does not apply. These helpers turn such raw values
//! into `Option`s so a sentinel can never leak into a calculation as a measurement.

/// Generic "not available" marker used by most numeric fields.
pub const INVALID: i32 = -1;

/// Floating point form of [`INVALID`].
pub const INVALID_F64: f64 = -1.0;

/// Marker used by `TimeDeltaBestSelf` when no reference lap exists.
pub const INVALID_DELTA: f64 = -1000.0;

/// Conversion from a raw telemetry value to an optional measurement.
pub trait Sentinel: Sized + Copy {
    /// Returns `None` when the value is the generic `-1` sentinel.
    fn known(self) -> Option<Self>;

    /// Returns `true` when the value carries real data.
    fn is_known(self) -> bool {
        self.known().is_some()
    }
}

impl Sentinel for f64 {
    fn known(self) -> Option<f64> {
        if self == INVALID_F64 || self.is_nan() { None } else { Some(self) }
    }
}

impl Sentinel for i32 {
    fn known(self) -> Option<i32> {
        if self == INVALID { None } else { Some(self) }
    }
}

/// Decodes `TimeDeltaBestSelf`, whose sentinel is `-1000` rather than `-1`.
pub fn known_delta(value: f64) -> Option<f64> {
    if value == INVALID_DELTA || value.is_nan() { None } else { Some(value) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn sentinels_are_unknown() {
        assert_eq!((-1.0f64).known(), None);
        assert_eq!((-1i32).known(), None);
        assert_eq!(f64::NAN.known(), None);
        assert_eq!(known_delta(-1000.0), None);
    }

    #[test]
    fn delta_accepts_minus_one() {
        // -1 s is a legitimate delta to the best lap
        assert_eq!(known_delta(-1.0), Some(-1.0));
    }

    proptest! {
        #[test]
        fn real_values_pass_through(value in -500.0f64..500.0) {
            prop_assume!(value != -1.0);
            prop_assert_eq!(value.known(), Some(value));
        }
    }
}
