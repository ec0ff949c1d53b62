//! Poll rate control for the request/response wire protocol

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rate at which the client pings the bridge for a new snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PollRate {
    /// The dash's nominal rate of 30 requests per second
    Native,

    /// Explicit rate in Hz. Zero is treated as one.
    Hz(u32),
}

impl Default for PollRate {
    fn default() -> Self {
        PollRate::Native
    }
}

impl PollRate {
    /// Nominal request rate of the original dash.
    pub const NATIVE_HZ: u32 = 30;

    /// Effective rate in Hz.
    pub fn hz(self) -> u32 {
        match self {
            PollRate::Native => Self::NATIVE_HZ,
            PollRate::Hz(hz) => hz.max(1),
        }
    }

    /// Interval between two pings.
    pub fn period(self) -> Duration {
        Duration::from_secs_f64(1.0 / self.hz() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_rate_is_roughly_33ms() {
        let period = PollRate::Native.period();
        assert!(period > Duration::from_millis(33));
        assert!(period < Duration::from_millis(34));
    }

    #[test]
    fn zero_hz_is_clamped() {
        assert_eq!(PollRate::Hz(0).hz(), 1);
        assert_eq!(PollRate::Hz(0).period(), Duration::from_secs(1));
    }
}
