//! Output cadence
use crate::types::{julian_date, Timestamp};

/// Is an output with period `days_between` due at `julian`?
///
/// `start` is the offset (days, counted from midnight) of the first output
/// and `step_minutes` the step length. An output is due when the time since
/// the offset is a multiple of the period, within half a step.
pub fn boolean_time(julian: f64, days_between: f64, start: f64, step_minutes: f64) -> bool {
    if !(days_between > 0.0) {
        return false;
    }
    let half_step = 0.5 * step_minutes / 1440.0;
    // Julian days begin at noon
    let elapsed = julian - 0.5 - start.max(0.0);
    if elapsed < -half_step {
        return false;
    }
    let phase = elapsed.rem_euclid(days_between);
    phase < half_step || days_between - phase <= half_step
}

/// [boolean_time] for a timestamp.
pub fn is_due(timestamp: &Timestamp, days_between: f64, start: f64, step_minutes: f64) -> bool {
    boolean_time(julian_date(timestamp), days_between, start, step_minutes)
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn at(hour: u32, minute: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2021, 3, 1)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn test_daily_at_midnight() {
        assert!(is_due(&at(0, 0), 1.0, 0.0, 60.0));
        for hour in 1..24 {
            assert!(!is_due(&at(hour, 0), 1.0, 0.0, 60.0), "hour {hour}");
        }
    }

    #[test]
    fn test_hourly_series() {
        let mut t = at(0, 0);
        let mut count = 0;
        for _ in 0..48 {
            if is_due(&t, 1.0 / 24.0, 0.0, 30.0) {
                count += 1;
            }
            t += Duration::minutes(30);
        }
        assert_eq!(count, 24);
    }

    #[test]
    fn test_start_offset() {
        // a quarter of a day: 06:00
        assert!(is_due(&at(6, 0), 1.0, 0.25, 60.0));
        assert!(!is_due(&at(0, 0), 1.0, 0.25, 60.0));
    }

    #[test]
    fn test_disabled_period() {
        assert!(!is_due(&at(0, 0), 0.0, 0.0, 60.0));
        assert!(!is_due(&at(0, 0), -1.0, 0.0, 60.0));
    }
}
