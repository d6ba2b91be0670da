//! Parking cost calculation.
//!
//! Pure functions of check-in time, check-out time and hourly rate. A stay is
//! always billed for at least one hour; the live estimate shown for active
//! reservations uses the raw elapsed time instead.

use chrono::{DateTime, Utc};

/// Minimum number of hours billed for any stay.
pub const MINIMUM_BILLED_HOURS: f64 = 1.0;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Elapsed time between check-in and check-out in fractional hours.
///
/// Negative when `check_out` precedes `check_in`.
#[must_use]
pub fn duration_hours(check_in: DateTime<Utc>, check_out: DateTime<Utc>) -> f64 {
    // Cast safety: millisecond spans of real stays are far below 2^53.
    #[allow(clippy::cast_precision_loss)]
    let millis = (check_out - check_in).num_milliseconds() as f64;
    millis / MILLIS_PER_HOUR
}

/// Hours charged for a stay of `duration` hours.
#[must_use]
pub fn billed_hours(duration: f64) -> f64 {
    duration.max(MINIMUM_BILLED_HOURS)
}

/// Computes the billed amount for a completed stay.
///
/// `round(max(duration, 1h) * hourly_rate, 2)`
///
/// # Example
/// ```
/// use chrono::{Duration, Utc};
/// use parking_buddy::core::billing::compute_cost;
///
/// let check_in = Utc::now();
/// let check_out = check_in + Duration::minutes(150);
/// assert!((compute_cost(check_in, check_out, 10.0) - 25.0).abs() < f64::EPSILON);
/// ```
#[must_use]
pub fn compute_cost(check_in: DateTime<Utc>, check_out: DateTime<Utc>, hourly_rate: f64) -> f64 {
    round_cents(billed_hours(duration_hours(check_in, check_out)) * hourly_rate)
}

/// Running cost of a stay that has not been released yet.
///
/// No minimum applies; this is an estimate only and is never persisted.
#[must_use]
pub fn running_cost(check_in: DateTime<Utc>, now: DateTime<Utc>, hourly_rate: f64) -> f64 {
    round_cents(duration_hours(check_in, now).max(0.0) * hourly_rate)
}

/// Rounds a money amount to two decimal places.
#[must_use]
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Rounds an hour count to two decimal places for display.
#[must_use]
pub fn round_hours(hours: f64) -> f64 {
    (hours * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, minute, second)
            .single()
            .unwrap()
    }

    #[test]
    fn test_duration_hours_preserves_fractions() {
        assert_eq!(duration_hours(at(10, 0, 0), at(12, 30, 0)), 2.5);
        assert_eq!(duration_hours(at(10, 0, 0), at(10, 15, 0)), 0.25);
        assert_eq!(duration_hours(at(10, 0, 0), at(10, 0, 0)), 0.0);
    }

    #[test]
    fn test_compute_cost_two_and_a_half_hours() {
        assert_eq!(compute_cost(at(10, 0, 0), at(12, 30, 0), 10.0), 25.0);
    }

    #[test]
    fn test_compute_cost_one_second_bills_one_hour() {
        assert_eq!(compute_cost(at(10, 0, 0), at(10, 0, 1), 10.0), 10.0);
    }

    #[test]
    fn test_compute_cost_zero_duration_bills_one_hour() {
        assert_eq!(compute_cost(at(10, 0, 0), at(10, 0, 0), 7.5), 7.5);
    }

    #[test]
    fn test_compute_cost_rounds_to_cents() {
        // 1h 20m at 10.0 = 13.333.. -> 13.33
        assert_eq!(compute_cost(at(10, 0, 0), at(11, 20, 0), 10.0), 13.33);
        // 1h 40m at 10.0 = 16.666.. -> 16.67
        assert_eq!(compute_cost(at(10, 0, 0), at(11, 40, 0), 10.0), 16.67);
    }

    #[test]
    fn test_compute_cost_long_stay() {
        let check_in = at(8, 0, 0);
        let check_out = check_in + Duration::days(2);
        assert_eq!(compute_cost(check_in, check_out, 12.5), 600.0);
    }

    #[test]
    fn test_running_cost_has_no_minimum() {
        assert_eq!(running_cost(at(10, 0, 0), at(10, 30, 0), 10.0), 5.0);
        assert_eq!(running_cost(at(10, 0, 0), at(9, 0, 0), 10.0), 0.0);
    }

    #[test]
    fn test_billed_hours_floor() {
        assert_eq!(billed_hours(0.0), 1.0);
        assert_eq!(billed_hours(0.99), 1.0);
        assert_eq!(billed_hours(3.25), 3.25);
    }

    #[test]
    fn test_round_hours() {
        assert_eq!(round_hours(1.0 / 3.0), 0.33);
        assert_eq!(round_hours(2.005_1), 2.01);
    }
}
