//! FIX timestamp decoding shared by the analysis stages.

use chrono::{DateTime, NaiveDateTime};

/// FIX TransactTime format, e.g. `20240102-09:30:00.000`.
const TRANSACT_TIME_FMT: &str = "%Y%m%d-%H:%M:%S%.f";

/// Parse a FIX TransactTime string. Returns None on malformed input;
/// callers treat unparseable timestamps as a non-fatal omission.
pub fn parse_transact_time(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TRANSACT_TIME_FMT).ok()
}

/// Convert a nanoseconds-since-epoch value (quote feed convention).
pub fn from_epoch_ns(ns: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(
        ns.div_euclid(1_000_000_000),
        ns.rem_euclid(1_000_000_000) as u32,
    )
    .map(|dt| dt.naive_utc())
}
