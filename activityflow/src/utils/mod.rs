//! Utility functions for identifiers and timestamp handling.

mod ids;
pub mod timestamps;

pub use ids::{encode_wire_id, generate_span_id, generate_trace_id, generate_uuid_v7};
pub use timestamps::{
    cutoff_before_now, format_iso8601, from_unix_millis, from_unix_nanos, iso_timestamp, now_utc,
    to_unix_millis, Timestamp, TimestampError,
};
