//! Timestamp conversions between chrono, storage and wire representations.

use chrono::{DateTime, TimeZone, Utc};
use std::time::Duration;
use thiserror::Error;

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

/// Errors that can occur during timestamp conversion.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimestampError {
    /// The value lies outside chrono's representable range.
    #[error("timestamp out of range: {0}")]
    OutOfRange(i64),

    /// The duration does not fit the target representation.
    #[error("duration too large: {0:?}")]
    DurationOverflow(Duration),
}

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Returns the current UTC time as an RFC 3339 string with microseconds.
#[must_use]
pub fn iso_timestamp() -> String {
    format_iso8601(&Utc::now())
}

/// Formats a timestamp as RFC 3339 with microseconds.
#[must_use]
pub fn format_iso8601(dt: &Timestamp) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Converts a timestamp to unix milliseconds, the storage representation.
#[must_use]
pub fn to_unix_millis(dt: &Timestamp) -> i64 {
    dt.timestamp_millis()
}

/// Converts unix milliseconds back to a timestamp.
pub fn from_unix_millis(millis: i64) -> Result<Timestamp, TimestampError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or(TimestampError::OutOfRange(millis))
}

/// Converts OTLP `*_unix_nano` fields to a timestamp truncated to milliseconds.
///
/// Returns `None` for zero, which OTLP uses for "unset".
#[must_use]
pub fn from_unix_nanos(nanos: u64) -> Option<Timestamp> {
    if nanos == 0 {
        return None;
    }
    let millis = i64::try_from(nanos / 1_000_000).ok()?;
    from_unix_millis(millis).ok()
}

/// Returns the timestamp `age` before now.
pub fn cutoff_before_now(age: Duration) -> Result<Timestamp, TimestampError> {
    let delta =
        chrono::Duration::from_std(age).map_err(|_| TimestampError::DurationOverflow(age))?;
    Utc::now()
        .checked_sub_signed(delta)
        .ok_or(TimestampError::DurationOverflow(age))
}
