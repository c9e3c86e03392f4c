//! Repository for activity log records.

use super::batch::{BatchRecord, BatchedRepository, RepositoryConfig};
use super::schema::LOGS_SCHEMA;
use super::stats::{stats_from_row, ActivityStats, ErrorFrequency};
use crate::errors::StorageError;
use crate::observability::{LogRecord, LogSink};
use crate::utils::{cutoff_before_now, from_unix_millis, to_unix_millis};
use rusqlite::types::Type;
use rusqlite::{params, Row, Statement};
use std::time::Duration;

/// Upper bound on rows returned by error-hash lookups.
pub const MAX_ERROR_ROWS: usize = 1000;

const SELECT_COLUMNS: &str = "SELECT id, timestamp, level, trace_id, span_id, orchestration_id,
        activity, message, duration_ms, input_hash, output_hash, error_message, error_hash
    FROM logs";

impl BatchRecord for LogRecord {
    const TABLE: &'static str = "logs";
    const INSERT_SQL: &'static str = "INSERT INTO logs (
            timestamp, level, trace_id, span_id, orchestration_id, activity, message,
            duration_ms, input_hash, output_hash, error_message, error_hash, raw_json
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)";

    fn insert(&self, stmt: &mut Statement<'_>) -> Result<(), StorageError> {
        let raw_json = self.to_json()?;
        stmt.execute(params![
            to_unix_millis(&self.timestamp),
            self.level.as_str(),
            self.trace_id,
            self.span_id,
            self.orchestration_id,
            self.activity,
            self.message,
            self.duration_ms,
            self.input_hash,
            self.output_hash,
            self.error_message,
            self.error_hash,
            raw_json,
        ])?;
        Ok(())
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<LogRecord> {
    let millis: i64 = row.get(1)?;
    let timestamp = from_unix_millis(millis)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Integer, Box::new(e)))?;
    let level: String = row.get(2)?;
    let level = level
        .parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    Ok(LogRecord {
        id: row.get(0)?,
        timestamp,
        level,
        trace_id: row.get(3)?,
        span_id: row.get(4)?,
        orchestration_id: row.get(5)?,
        activity: row.get(6)?,
        message: row.get(7)?,
        duration_ms: row.get(8)?,
        input_hash: row.get(9)?,
        output_hash: row.get(10)?,
        error_message: row.get(11)?,
        error_hash: row.get(12)?,
    })
}

/// Batched store of [`LogRecord`]s with correlation and analytical queries.
pub struct LogRepository {
    inner: BatchedRepository<LogRecord>,
}

impl LogRepository {
    /// Opens (or creates) the `logs` table.
    pub fn open(config: &RepositoryConfig) -> Result<Self, StorageError> {
        Ok(Self {
            inner: BatchedRepository::open(config, LOGS_SCHEMA)?,
        })
    }

    /// Buffers a record; see [`BatchedRepository::write`].
    pub fn write(&self, record: LogRecord) -> Result<(), StorageError> {
        self.inner.write(record)
    }

    /// Persists all pending records in one transaction.
    pub fn flush(&self) -> Result<usize, StorageError> {
        self.inner.flush()
    }

    /// Returns the number of buffered records.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.inner.pending_len()
    }

    /// Stops the flush task, flushes, and releases the database.
    pub async fn close(&self) -> Result<(), StorageError> {
        self.inner.close().await
    }

    /// Returns true once closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Returns all records of a trace in append order.
    pub fn by_trace_id(&self, trace_id: &str) -> Result<Vec<LogRecord>, StorageError> {
        self.query(
            &format!("{SELECT_COLUMNS} WHERE trace_id = ?1 ORDER BY id ASC"),
            params![trace_id],
        )
    }

    /// Returns all records of an orchestration in append order.
    pub fn by_orchestration_id(&self, orchestration_id: &str) -> Result<Vec<LogRecord>, StorageError> {
        self.query(
            &format!("{SELECT_COLUMNS} WHERE orchestration_id = ?1 ORDER BY id ASC"),
            params![orchestration_id],
        )
    }

    /// Returns the most recent records sharing an error grouping hash.
    pub fn by_error_hash(&self, error_hash: &str) -> Result<Vec<LogRecord>, StorageError> {
        self.query(
            &format!(
                "{SELECT_COLUMNS} WHERE error_hash = ?1 ORDER BY timestamp DESC, id DESC LIMIT {MAX_ERROR_ROWS}"
            ),
            params![error_hash],
        )
    }

    /// Aggregates duration per activity over the trailing `window`, keeping
    /// activities whose slowest run exceeded `threshold_ms`. Slowest average first.
    pub fn slow_activities(
        &self,
        threshold_ms: i64,
        window: Duration,
        limit: usize,
    ) -> Result<Vec<ActivityStats>, StorageError> {
        let cutoff = window_cutoff(window)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.inner.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT activity,
                        COUNT(*) AS count,
                        AVG(duration_ms) AS avg_duration_ms,
                        MAX(duration_ms) AS max_duration_ms,
                        MIN(duration_ms) AS min_duration_ms
                 FROM logs
                 WHERE duration_ms > 0 AND activity IS NOT NULL AND timestamp > ?1
                 GROUP BY activity
                 HAVING MAX(duration_ms) > ?2
                 ORDER BY avg_duration_ms DESC
                 LIMIT ?3",
            )?;
            let rows = stmt
                .query_map(params![cutoff, threshold_ms, limit], stats_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns error groups ordered by how often they occurred.
    pub fn error_frequency(&self, limit: usize) -> Result<Vec<ErrorFrequency>, StorageError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.inner.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT error_hash, MAX(error_message) AS sample, COUNT(*) AS frequency
                 FROM logs
                 WHERE error_message IS NOT NULL AND error_hash IS NOT NULL
                 GROUP BY error_hash
                 ORDER BY frequency DESC, error_hash ASC
                 LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit], |row| {
                    Ok(ErrorFrequency {
                        error_hash: row.get(0)?,
                        sample_message: row.get(1)?,
                        frequency: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Deletes rows strictly older than `age`.
    pub fn prune_older_than(&self, age: Duration) -> Result<usize, StorageError> {
        self.inner.prune_older_than(age)
    }

    fn query(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<LogRecord>, StorageError> {
        self.inner.with_connection(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map(params, record_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

impl LogSink for LogRepository {
    fn write_log(&self, record: LogRecord) -> Result<(), StorageError> {
        self.write(record)
    }
}

pub(crate) fn window_cutoff(window: Duration) -> Result<i64, StorageError> {
    cutoff_before_now(window)
        .map(|ts| to_unix_millis(&ts))
        .map_err(|e| StorageError::InvalidValue {
            column: "timestamp",
            detail: e.to_string(),
        })
}
