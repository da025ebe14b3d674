//! Time utility functions
//!
//! Zoned timestamps are persisted as a pair of integers: microseconds since the
//! Unix epoch (UTC) and the UTC offset in seconds. Range predicates only touch
//! the first column, the second one restores the original zone on read.

use chrono::{DateTime, FixedOffset, Offset, TimeZone, Utc};

/// Split a zoned timestamp into `(utc_micros, offset_secs)` for storage
pub fn to_storage(ts: &DateTime<FixedOffset>) -> (i64, i32) {
    (ts.timestamp_micros(), ts.offset().local_minus_utc())
}

/// Rebuild a zoned timestamp from its stored parts
pub fn from_storage(micros: i64, offset_secs: i32) -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(offset_secs).unwrap_or_else(|| {
        tracing::warn!(offset_secs, "Invalid UTC offset, using UTC");
        utc_offset()
    });
    let utc = DateTime::from_timestamp_micros(micros).unwrap_or_else(|| {
        tracing::warn!(micros, "Invalid timestamp, using epoch");
        DateTime::UNIX_EPOCH
    });
    utc.with_timezone(&offset)
}

/// Microseconds since the Unix epoch for a UTC instant
pub fn utc_micros(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

/// The zero offset
pub fn utc_offset() -> FixedOffset {
    Utc.fix()
}

/// Convert whole epoch seconds to a UTC-zoned timestamp
pub fn epoch_secs_to_zoned(secs: i64) -> Option<DateTime<FixedOffset>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .map(|dt| dt.with_timezone(&utc_offset()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_storage_roundtrip_preserves_offset() {
        let ist = FixedOffset::east_opt(5 * 3600 + 1800).unwrap();
        let ts = ist.with_ymd_and_hms(2019, 3, 13, 22, 2, 1).unwrap();

        let (micros, offset) = to_storage(&ts);
        assert_eq!(offset, 19_800);

        let back = from_storage(micros, offset);
        assert_eq!(back, ts);
        assert_eq!(back.offset(), ts.offset());
        assert_eq!(back.hour(), 22);
    }

    #[test]
    fn test_from_storage_invalid_offset_falls_back_to_utc() {
        let ts = from_storage(0, 200_000);
        assert_eq!(ts.offset().local_minus_utc(), 0);
        assert_eq!(ts.timestamp(), 0);
    }

    #[test]
    fn test_epoch_secs_to_zoned() {
        let ts = epoch_secs_to_zoned(1_552_777_235).unwrap();
        assert_eq!(ts.to_rfc3339(), "2019-03-16T23:00:35+00:00");
    }

    #[test]
    fn test_utc_micros() {
        let ts = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 1).unwrap();
        assert_eq!(utc_micros(&ts), 1_000_000);
    }
}
