//! Time utilities
//!
//! All timestamps in the platform are UTC epoch milliseconds stored as
//! i64, both in memory and in database columns.

/// Current UTC timestamp in milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Format an epoch-millis timestamp as a UTC calendar date (YYYY-MM-DD)
///
/// Used for date-partitioned object storage keys. Falls back to the
/// epoch date for out-of-range values rather than failing.
pub fn millis_to_date(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .unwrap_or_else(|| chrono::DateTime::from_timestamp_millis(0).unwrap())
        .format("%Y-%m-%d")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_to_date_formats_utc() {
        // 2024-01-01 00:00:00 UTC
        assert_eq!(millis_to_date(1_704_067_200_000), "2024-01-01");
        // one millisecond before midnight stays on the same day
        assert_eq!(millis_to_date(1_704_067_199_999), "2023-12-31");
    }

    #[test]
    fn millis_to_date_out_of_range_falls_back() {
        assert_eq!(millis_to_date(i64::MAX), "1970-01-01");
    }
}
