//! Human-readable duration formatting.

/// Format a duration in seconds as a compact human-readable string.
///
/// Sub-minute durations render as seconds, sub-hour as minutes and
/// seconds, anything longer as hours and minutes. Days are not split
/// out, so a long run reads `25h 0m`. Fractional seconds are truncated
/// toward zero.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds as i64;
    if total < 60 {
        format!("{}s", total)
    } else if total < 3600 {
        format!("{}m {}s", total / 60, total % 60)
    } else {
        format!("{}h {}m", total / 3600, (total % 3600) / 60)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_only() {
        assert_eq!(format_duration(0.0), "0s");
        assert_eq!(format_duration(1.0), "1s");
        assert_eq!(format_duration(59.9), "59s");
    }

    #[test]
    fn minutes_and_seconds() {
        assert_eq!(format_duration(60.0), "1m 0s");
        assert_eq!(format_duration(119.5), "1m 59s");
        assert_eq!(format_duration(3599.0), "59m 59s");
    }

    #[test]
    fn hours_and_minutes() {
        assert_eq!(format_duration(3600.0), "1h 0m");
        assert_eq!(format_duration(3661.0), "1h 1m");
        assert_eq!(format_duration(7322.0), "2h 2m");
    }

    #[test]
    fn long_runs_stay_in_hours() {
        assert_eq!(format_duration(90000.0), "25h 0m");
    }

    #[test]
    fn negative_durations_pass_through() {
        // A skewed clock can put submit time in the future; the caller
        // sees the raw value rather than a silent clamp.
        assert_eq!(format_duration(-5.0), "-5s");
    }
}
