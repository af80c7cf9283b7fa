//! Identifier and timestamp helpers.
//!
//! Every entity gets a 26-character ULID: lexicographically sortable,
//! time-prefixed, collision-safe without coordination. Timestamps are
//! unix milliseconds (UTC) in the database and RFC 3339 on the wire.

use chrono::{DateTime, SecondsFormat, Utc};
use ulid::Ulid;

/// Generate a fresh 26-character sortable identifier.
pub fn new_id() -> String {
    Ulid::new().to_string()
}

/// Current UTC time as unix milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Render unix milliseconds as RFC 3339 with millisecond precision.
///
/// Out-of-range values (pre-1678 or post-2262) cannot come from `now_ms`,
/// so this falls back to the epoch rather than panicking.
pub fn rfc3339_ms(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap_or_else(|| DateTime::<Utc>::from_timestamp_millis(0).unwrap())
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}
