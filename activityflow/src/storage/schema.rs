//! SQL schema for the telemetry store.
//!
//! Timestamps are stored as unix milliseconds. Index names carry the table
//! name so both tables can share one database file.

/// Schema of the `logs` table and its indexes.
pub const LOGS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    level TEXT NOT NULL,
    trace_id TEXT NOT NULL,
    span_id TEXT,
    orchestration_id TEXT,
    activity TEXT,
    message TEXT NOT NULL,
    duration_ms INTEGER,
    input_hash TEXT,
    output_hash TEXT,
    error_message TEXT,
    error_hash TEXT,
    raw_json TEXT
);

CREATE INDEX IF NOT EXISTS idx_logs_trace_id ON logs(trace_id);
CREATE INDEX IF NOT EXISTS idx_logs_orchestration_id ON logs(orchestration_id);
CREATE INDEX IF NOT EXISTS idx_logs_trace_activity ON logs(trace_id, activity, timestamp);
CREATE INDEX IF NOT EXISTS idx_logs_error_hash ON logs(error_hash);
CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs(timestamp);
CREATE INDEX IF NOT EXISTS idx_logs_activity_timestamp ON logs(activity, timestamp DESC);
";

/// Schema of the `task_events` table and its indexes.
pub const TASK_EVENTS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS task_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    trace_id TEXT NOT NULL,
    span_id TEXT,
    orchestration_id TEXT,
    event_type TEXT NOT NULL,
    activity TEXT,
    payload TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_trace_id ON task_events(trace_id);
CREATE INDEX IF NOT EXISTS idx_events_orchestration_id ON task_events(orchestration_id);
CREATE INDEX IF NOT EXISTS idx_events_trace_activity ON task_events(trace_id, activity, timestamp);
CREATE INDEX IF NOT EXISTS idx_events_timestamp ON task_events(timestamp);
CREATE INDEX IF NOT EXISTS idx_events_event_type ON task_events(event_type);
CREATE INDEX IF NOT EXISTS idx_events_orchestration_timestamp ON task_events(orchestration_id, timestamp);
";

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schemas_apply_to_one_database() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(LOGS_SCHEMA).unwrap();
        conn.execute_batch(TASK_EVENTS_SCHEMA).unwrap();
        // idempotent
        conn.execute_batch(LOGS_SCHEMA).unwrap();

        let indexes: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_%'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(indexes, 12);
    }
}
