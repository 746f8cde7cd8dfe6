//! Timestamp utilities
//!
//! Waveform timing is carried as `DateTime<Utc>` while the numerical code
//! works in fractional seconds; these helpers convert between the two at
//! microsecond resolution.

use chrono::{DateTime, Duration, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Shift a timestamp by a (possibly negative, possibly fractional) number of seconds
pub fn add_seconds(time: DateTime<Utc>, seconds: f64) -> DateTime<Utc> {
    if !seconds.is_finite() {
        return time;
    }
    let micros = (seconds * 1_000_000.0).round() as i64;
    time + Duration::microseconds(micros)
}

/// Signed number of seconds from `start` to `end`
pub fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let delta = end - start;
    match delta.num_microseconds() {
        Some(micros) => micros as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1_000.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn origin() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_now_returns_recent_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01 00:00:00 UTC
        assert!(timestamp.timestamp() < 4_102_444_800); // 2100-01-01 00:00:00 UTC
    }

    #[test]
    fn test_add_seconds_fractional() {
        let shifted = add_seconds(origin(), 1.5);
        assert_eq!(seconds_between(origin(), shifted), 1.5);
    }

    #[test]
    fn test_add_seconds_negative() {
        let shifted = add_seconds(origin(), -20.0);
        assert_eq!(seconds_between(shifted, origin()), 20.0);
    }

    #[test]
    fn test_add_seconds_non_finite_is_identity() {
        assert_eq!(add_seconds(origin(), f64::NAN), origin());
        assert_eq!(add_seconds(origin(), f64::INFINITY), origin());
    }

    #[test]
    fn test_seconds_between_is_signed() {
        let later = add_seconds(origin(), 250.25);
        assert_eq!(seconds_between(origin(), later), 250.25);
        assert_eq!(seconds_between(later, origin()), -250.25);
    }
}
