//! Text formatting shared by the metric engines

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

/// Layout used by [`format_time`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFormat {
    /// `s.SSS`, seconds are not wrapped at 60
    Seconds,
    /// `m:ss.SSS`
    MinutesSeconds,
    /// `m:ss`, used for countdowns
    MinutesWholeSeconds,
    /// `H:mm:ss`
    Hours,
}

/// Format a duration in seconds.
///
/// Negative values get a `-` prefix; positive values get `+` when `plus_prefix` is set.
/// Milliseconds are rounded to the nearest integer.
pub fn format_time(seconds: f64, format: TimeFormat, plus_prefix: bool) -> String {
    let prefix = if seconds < 0.0 {
        "-"
    } else if plus_prefix {
        "+"
    } else {
        ""
    };

    let total_ms = (seconds.abs() * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;

    match format {
        TimeFormat::Seconds => format!("{prefix}{total_secs}.{ms:03}"),
        TimeFormat::MinutesSeconds => {
            format!("{prefix}{}:{:02}.{ms:03}", total_secs / 60, total_secs % 60)
        }
        TimeFormat::MinutesWholeSeconds => {
            format!("{prefix}{}:{:02}", total_secs / 60, total_secs % 60)
        }
        TimeFormat::Hours => format!(
            "{prefix}{}:{:02}:{:02}",
            total_secs / 3600,
            (total_secs / 60) % 60,
            total_secs % 60
        ),
    }
}

/// Format a lap or gap time: `s.SSS` under a minute, `m:ss.SSS` from a minute on.
pub fn format_lap_time(seconds: f64, plus_prefix: bool) -> String {
    let format =
        if seconds.abs() >= 60.0 { TimeFormat::MinutesSeconds } else { TimeFormat::Seconds };
    format_time(seconds, format, plus_prefix)
}

/// Decode a base64 driver name.
///
/// Names are UTF-8 bytes padded with NULs and sometimes `0xFF` filler. Text that is not
/// valid base64 is returned unchanged.
pub fn decode_name(encoded: &str) -> String {
    let Ok(bytes) = STANDARD.decode(encoded.trim()) else {
        return encoded.to_string();
    };

    let bytes: Vec<u8> = bytes.into_iter().filter(|b| *b != 0xFF && *b != 0).collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Meters per second to kilometres per hour.
pub fn mps_to_kph(mps: f64) -> f64 {
    mps * 3.6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_layout() {
        assert_eq!(format_time(1.5, TimeFormat::Seconds, false), "1.500");
        assert_eq!(format_time(1.5, TimeFormat::Seconds, true), "+1.500");
        assert_eq!(format_time(-0.25, TimeFormat::Seconds, true), "-0.250");
        assert_eq!(format_time(0.0, TimeFormat::Seconds, true), "+0.000");
    }

    #[test]
    fn minutes_layout() {
        assert_eq!(format_time(83.456, TimeFormat::MinutesSeconds, false), "1:23.456");
        assert_eq!(format_time(-119.999, TimeFormat::MinutesSeconds, false), "-1:59.999");
        assert_eq!(format_time(125.0, TimeFormat::MinutesWholeSeconds, false), "2:05");
        assert_eq!(format_time(3725.0, TimeFormat::Hours, false), "1:02:05");
    }

    #[test]
    fn milliseconds_are_rounded() {
        assert_eq!(format_time(59.9996, TimeFormat::Seconds, false), "60.000");
        assert_eq!(format_time(1.0004, TimeFormat::Seconds, false), "1.000");
    }

    #[test]
    fn lap_time_switches_layout_after_a_minute() {
        assert_eq!(format_lap_time(59.999, false), "59.999");
        assert_eq!(format_lap_time(60.0, false), "1:00.000");
        assert_eq!(format_lap_time(60.5, false), "1:00.500");
        assert_eq!(format_lap_time(-75.0, false), "-1:15.000");
    }

    #[test]
    fn names_decode_with_padding() {
        // "Aleksi Kärkkäinen" followed by NUL padding
        let mut raw = "Aleksi Kärkkäinen".as_bytes().to_vec();
        raw.extend_from_slice(&[0, 0, 0, 0xFF]);
        let encoded = STANDARD.encode(&raw);

        assert_eq!(decode_name(&encoded), "Aleksi Kärkkäinen");
    }

    #[test]
    fn undecodable_names_pass_through() {
        assert_eq!(decode_name("not base64!"), "not base64!");
    }
}
