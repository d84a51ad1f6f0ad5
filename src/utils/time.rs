use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone};

pub const MS_PER_MINUTE: u64 = 60 * 1000;

/// This is the standard way of converting a date to a string in sitetimer. Persisted as
/// `lastDate` on every site record.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Returns start of the next day. Falls back to a plain 24 hour step when local midnight does
/// not exist (DST gaps).
pub fn next_day_start<Tz: TimeZone>(date: DateTime<Tz>) -> DateTime<Tz> {
    let tomorrow = date + Duration::days(1);
    tomorrow
        .with_time(NaiveTime::MIN)
        .earliest()
        .unwrap_or(tomorrow)
}

/// Time left until the next local midnight, never negative.
pub fn until_next_day<Tz: TimeZone>(now: DateTime<Tz>) -> std::time::Duration {
    (next_day_start(now.clone()) - now)
        .to_std()
        .unwrap_or_default()
}

/// Remaining budget rounded up to whole minutes, so any leftover second still reads as a minute.
pub fn remaining_minutes(time_limit_ms: u64, time_spent_ms: u64) -> u64 {
    time_limit_ms.saturating_sub(time_spent_ms).div_ceil(MS_PER_MINUTE)
}

pub fn ms_to_minutes(ms: u64) -> f64 {
    ms as f64 / MS_PER_MINUTE as f64
}
