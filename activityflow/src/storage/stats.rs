//! Aggregate query results.

use serde::{Deserialize, Serialize};

/// Per-activity latency aggregate over a trailing window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityStats {
    /// Activity name.
    pub activity: String,
    /// Number of samples in the window.
    pub count: i64,
    /// Mean latency in milliseconds.
    pub avg_ms: f64,
    /// Highest latency in milliseconds.
    pub max_ms: i64,
    /// Lowest latency in milliseconds.
    pub min_ms: i64,
}

/// How often one error group occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrequency {
    /// Grouping hash.
    pub error_hash: String,
    /// One message from the group.
    pub sample_message: String,
    /// Number of occurrences.
    pub frequency: i64,
}

pub(crate) fn stats_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ActivityStats> {
    Ok(ActivityStats {
        activity: row.get(0)?,
        count: row.get(1)?,
        avg_ms: row.get(2)?,
        max_ms: row.get(3)?,
        min_ms: row.get(4)?,
    })
}
