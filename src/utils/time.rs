use chrono::{DateTime, Utc};

pub fn time_millis() -> i64 {
    let time: DateTime<chrono::Utc> = Utc::now();
    time.timestamp_millis()
}

/// Current time in milliseconds, strictly greater than `previous`.
pub fn next_millis(previous: i64) -> i64 {
    time_millis().max(previous + 1)
}
