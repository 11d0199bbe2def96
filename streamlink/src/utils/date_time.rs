use std::time::{Duration, Instant, UNIX_EPOCH};

use chrono::{DateTime, Local, Utc};

pub const FMT_DATE_TIME_1: &str = "%Y-%m-%dT%T%.3f";

lazy_static! {
    static ref PROCESS_EPOCH: Instant = Instant::now();
}

/// Monotonic nanoseconds since an arbitrary process-local origin. Deadline
/// arithmetic only; never compare against wall-clock timestamps.
pub fn monotonic_nanos() -> u64 {
    PROCESS_EPOCH.elapsed().as_nanos() as u64
}

/// format timestamp to string
pub fn fmt_date_time(dur: Duration, fmt: &str) -> String {
    let utc_dt: DateTime<Utc> = (UNIX_EPOCH + dur).into();
    let local_dt = utc_dt.with_timezone(&Local);
    local_dt.format(fmt).to_string()
}

/// for watermark debug print; event time may sit at the i64 rails
pub fn timestamp_str(timestamp: i64) -> String {
    if timestamp == i64::MIN {
        return "MIN".to_string();
    }
    if timestamp == i64::MAX {
        return "MAX".to_string();
    }
    if timestamp < 0 {
        return timestamp.to_string();
    }
    format!(
        "{}({})",
        fmt_date_time(Duration::from_millis(timestamp as u64), FMT_DATE_TIME_1),
        timestamp
    )
}

#[cfg(test)]
mod tests {
    use crate::utils::date_time::{monotonic_nanos, timestamp_str};

    #[test]
    pub fn monotonic_nanos_test() {
        let a = monotonic_nanos();
        let b = monotonic_nanos();
        assert!(b >= a);
    }

    #[test]
    pub fn timestamp_str_test() {
        assert_eq!(timestamp_str(i64::MIN), "MIN");
        assert_eq!(timestamp_str(i64::MAX), "MAX");
        assert_eq!(timestamp_str(-42), "-42");
        assert!(timestamp_str(1_000).contains("1000"));
    }
}
