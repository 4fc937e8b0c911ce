//! Time Utilities

use chrono::{DateTime, Utc};

/// Current time in milliseconds since epoch
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert an entry timestamp into a UTC datetime
pub fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}
