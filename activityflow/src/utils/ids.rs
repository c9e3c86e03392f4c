//! Identifier generation for trace correlation.

use rand::RngCore;
use uuid::Uuid;

/// Generates a 128-bit random trace id as 32 lowercase hex characters (W3C trace context).
#[must_use]
pub fn generate_trace_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generates a 64-bit random span id as 16 lowercase hex characters.
#[must_use]
pub fn generate_span_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generates a time-ordered UUID v7, used for invocation ids.
#[must_use]
pub fn generate_uuid_v7() -> Uuid {
    Uuid::now_v7()
}

/// Hex-encodes a wire id, returning `None` when it is empty or all zeros.
#[must_use]
pub fn encode_wire_id(bytes: &[u8]) -> Option<String> {
    if bytes.iter().all(|b| *b == 0) {
        None
    } else {
        Some(hex::encode(bytes))
    }
}
