//! Conversion between directory-service file-time values (100-nanosecond
//! intervals since 1601-01-01 UTC) and `chrono` UTC timestamps.

use chrono::{DateTime, TimeZone, Utc};

/// Sentinel meaning "never" for `accountExpires`/`lastLogonTimeStamp`-style
/// attributes, carried through unconverted.
pub const NEVER_FILETIME: i64 = 0x7FFF_FFFF_FFFF_FFFF;

const FILETIME_EPOCH_DIFF_100NS: i64 = 116_444_736_000_000_000;

/// Converts a raw file-time value into a UTC timestamp, or `None` for the
/// `0` and `NEVER_FILETIME` sentinels that directory services use to mean
/// "unset" or "never expires".
pub fn filetime_to_utc(raw: i64) -> Option<DateTime<Utc>> {
    if raw == 0 || raw == NEVER_FILETIME {
        return None;
    }
    let unix_100ns = raw - FILETIME_EPOCH_DIFF_100NS;
    let unix_secs = unix_100ns / 10_000_000;
    let remainder_100ns = unix_100ns % 10_000_000;
    let nanos = (remainder_100ns * 100) as u32;
    Utc.timestamp_opt(unix_secs, nanos).single()
}

/// Converts a UTC timestamp back into directory file-time form. Inverse of
/// `filetime_to_utc` for values it did not map to `None`.
pub fn utc_to_filetime(ts: DateTime<Utc>) -> i64 {
    let unix_secs = ts.timestamp();
    let nanos = ts.timestamp_subsec_nanos();
    unix_secs * 10_000_000 + (nanos / 100) as i64 + FILETIME_EPOCH_DIFF_100NS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_and_never_map_to_none() {
        assert!(filetime_to_utc(0).is_none());
        assert!(filetime_to_utc(NEVER_FILETIME).is_none());
    }

    #[test]
    fn round_trips_a_known_instant() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        let raw = utc_to_filetime(ts);
        let back = filetime_to_utc(raw).unwrap();
        assert_eq!(ts, back);
    }

    #[test]
    fn epoch_boundary_is_1601() {
        let ts = filetime_to_utc(FILETIME_EPOCH_DIFF_100NS).unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap());
    }
}
