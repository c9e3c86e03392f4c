//! Repository for telemetry events received over OTLP.

use super::batch::{BatchRecord, BatchedRepository, RepositoryConfig};
use super::log_repository::window_cutoff;
use super::schema::TASK_EVENTS_SCHEMA;
use super::stats::{stats_from_row, ActivityStats};
use crate::errors::StorageError;
use crate::events::{EventKind, EventPayload, EventSink, TelemetryEvent};
use crate::utils::{from_unix_millis, to_unix_millis};
use rusqlite::types::Type;
use rusqlite::{params, Row, Statement};
use std::time::Duration;

/// Upper bound on rows returned by event-type lookups.
pub const MAX_EVENT_TYPE_ROWS: usize = 1000;

const SELECT_COLUMNS: &str =
    "SELECT id, timestamp, trace_id, span_id, orchestration_id, event_type, activity, payload
    FROM task_events";

impl BatchRecord for TelemetryEvent {
    const TABLE: &'static str = "task_events";
    const INSERT_SQL: &'static str = "INSERT INTO task_events (
            timestamp, trace_id, span_id, orchestration_id, event_type, activity, payload
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

    fn insert(&self, stmt: &mut Statement<'_>) -> Result<(), StorageError> {
        let payload = self.payload.to_json()?;
        stmt.execute(params![
            to_unix_millis(&self.timestamp),
            self.trace_id,
            self.span_id,
            self.orchestration_id,
            self.kind().as_str(),
            self.activity,
            payload,
        ])?;
        Ok(())
    }
}

fn conversion_error<E>(column: usize, ty: Type, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, ty, Box::new(err))
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<TelemetryEvent> {
    let millis: i64 = row.get(1)?;
    let timestamp = from_unix_millis(millis).map_err(|e| conversion_error(1, Type::Integer, e))?;
    let event_type: String = row.get(5)?;
    let kind: EventKind = event_type.parse().map_err(|e: String| {
        conversion_error(5, Type::Text, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })?;
    let payload: String = row.get(7)?;
    let payload = EventPayload::from_json(kind, &payload).map_err(|e| conversion_error(7, Type::Text, e))?;

    Ok(TelemetryEvent {
        id: row.get(0)?,
        timestamp,
        trace_id: row.get(2)?,
        span_id: row.get(3)?,
        orchestration_id: row.get(4)?,
        activity: row.get(6)?,
        payload,
    })
}

/// Batched store of [`TelemetryEvent`]s.
pub struct TaskEventRepository {
    inner: BatchedRepository<TelemetryEvent>,
}

impl TaskEventRepository {
    /// Opens (or creates) the `task_events` table.
    pub fn open(config: &RepositoryConfig) -> Result<Self, StorageError> {
        Ok(Self {
            inner: BatchedRepository::open(config, TASK_EVENTS_SCHEMA)?,
        })
    }

    /// Buffers an event; see [`BatchedRepository::write`].
    ///
    /// Events holding NaN or infinite numbers are rejected up front, since
    /// JSON would store them as `null` and break every read of the row.
    pub fn write(&self, event: TelemetryEvent) -> Result<(), StorageError> {
        if !event.payload.is_finite() {
            return Err(StorageError::InvalidValue {
                column: "payload",
                detail: format!("non-finite number in {} event", event.kind()),
            });
        }
        self.inner.write(event)
    }

    /// Persists all pending events in one transaction.
    pub fn flush(&self) -> Result<usize, StorageError> {
        self.inner.flush()
    }

    /// Returns the number of buffered events.
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

    /// Returns all events of a trace in append order.
    pub fn by_trace_id(&self, trace_id: &str) -> Result<Vec<TelemetryEvent>, StorageError> {
        self.query(
            &format!("{SELECT_COLUMNS} WHERE trace_id = ?1 ORDER BY id ASC"),
            params![trace_id],
        )
    }

    /// Returns all events of an orchestration in append order.
    pub fn by_orchestration_id(
        &self,
        orchestration_id: &str,
    ) -> Result<Vec<TelemetryEvent>, StorageError> {
        self.query(
            &format!("{SELECT_COLUMNS} WHERE orchestration_id = ?1 ORDER BY id ASC"),
            params![orchestration_id],
        )
    }

    /// Returns the most recent events of one kind.
    pub fn by_event_type(&self, kind: EventKind) -> Result<Vec<TelemetryEvent>, StorageError> {
        self.query(
            &format!(
                "{SELECT_COLUMNS} WHERE event_type = ?1 ORDER BY timestamp DESC, id DESC LIMIT {MAX_EVENT_TYPE_ROWS}"
            ),
            params![kind.as_str()],
        )
    }

    /// Aggregates span latency per activity over the trailing `window`,
    /// keeping activities whose slowest span exceeded `threshold_ms`.
    pub fn activity_performance(
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
                        AVG(json_extract(payload, '$.latency_ms')) AS avg_latency,
                        MAX(json_extract(payload, '$.latency_ms')) AS max_latency,
                        MIN(json_extract(payload, '$.latency_ms')) AS min_latency
                 FROM task_events
                 WHERE event_type = 'trace'
                   AND activity IS NOT NULL
                   AND timestamp > ?1
                   AND json_extract(payload, '$.latency_ms') IS NOT NULL
                 GROUP BY activity
                 HAVING MAX(json_extract(payload, '$.latency_ms')) > ?2
                 ORDER BY avg_latency DESC
                 LIMIT ?3",
            )?;
            let rows = stmt
                .query_map(params![cutoff, threshold_ms, limit], stats_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns the most recent events that carry an error or an error span status.
    pub fn error_events(&self, limit: usize) -> Result<Vec<TelemetryEvent>, StorageError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.query(
            &format!(
                "{SELECT_COLUMNS}
                 WHERE json_extract(payload, '$.error') IS NOT NULL
                    OR json_extract(payload, '$.span_status') IN ('ERROR', 'STATUS_CODE_ERROR')
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?1"
            ),
            params![limit],
        )
    }

    /// Deletes rows strictly older than `age`.
    pub fn prune_older_than(&self, age: Duration) -> Result<usize, StorageError> {
        self.inner.prune_older_than(age)
    }

    fn query(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<TelemetryEvent>, StorageError> {
        self.inner.with_connection(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map(params, event_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

impl EventSink for TaskEventRepository {
    fn write_event(&self, event: TelemetryEvent) -> Result<(), StorageError> {
        self.write(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{AttributeValue, Attributes, LogPayload, MetricPayload, SpanPayload, ACTIVITY_KEY};
    use crate::utils::now_utc;
    use pretty_assertions::assert_eq;

    fn repo() -> TaskEventRepository {
        TaskEventRepository::open(&RepositoryConfig::in_memory()).unwrap()
    }

    fn span(trace: &str, activity: &str, latency_ms: i64, status: &str) -> TelemetryEvent {
        let mut attributes = Attributes::new();
        attributes.insert(ACTIVITY_KEY.to_string(), AttributeValue::from(activity));
        TelemetryEvent::span(
            trace,
            now_utc(),
            SpanPayload {
                span_name: activity.to_string(),
                span_status: status.to_string(),
                latency_ms,
                attributes,
                ..SpanPayload::default()
            },
        )
    }

    #[test]
    fn test_round_trip_preserves_payload_kind() {
        let repo = repo();
        repo.write(TelemetryEvent::log(
            "t1",
            now_utc(),
            LogPayload {
                message: "hello".into(),
                severity: "INFO".into(),
                ..LogPayload::default()
            },
        ))
        .unwrap();
        repo.write(TelemetryEvent::metric(
            "t1",
            now_utc(),
            MetricPayload {
                metric_name: "queue_depth".into(),
                metric_value: 3.0,
                ..MetricPayload::default()
            },
        ))
        .unwrap();
        repo.write(span("t1", "Charge", 120, "OK").with_span_id("abcd")).unwrap();
        repo.flush().unwrap();

        let events = repo.by_trace_id("t1").unwrap();
        let kinds: Vec<_> = events.iter().map(TelemetryEvent::kind).collect();
        assert_eq!(kinds, vec![EventKind::Log, EventKind::Metric, EventKind::Trace]);
        assert_eq!(events[2].activity.as_deref(), Some("Charge"));
        assert_eq!(events[2].span_id.as_deref(), Some("abcd"));
        match &events[1].payload {
            EventPayload::Metric(m) => assert_eq!(m.metric_name, "queue_depth"),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_by_event_type_and_orchestration() {
        let repo = repo();
        repo.write(span("t1", "A", 10, "OK").with_orchestration_id("order-1")).unwrap();
        repo.write(span("t2", "B", 10, "OK").with_orchestration_id("order-2")).unwrap();
        repo.flush().unwrap();

        assert_eq!(repo.by_event_type(EventKind::Trace).unwrap().len(), 2);
        assert!(repo.by_event_type(EventKind::Log).unwrap().is_empty());
        let order = repo.by_orchestration_id("order-1").unwrap();
        assert_eq!(order.len(), 1);
        assert_eq!(order[0].trace_id, "t1");
    }

    #[test]
    fn test_activity_performance() {
        let repo = repo();
        repo.write(span("t", "Charge", 1450, "OK")).unwrap();
        repo.write(span("t", "Charge", 50, "OK")).unwrap();
        repo.write(span("t", "Reserve", 20, "OK")).unwrap();
        repo.flush().unwrap();

        let perf = repo
            .activity_performance(1000, Duration::from_secs(3600), 10)
            .unwrap();
        assert_eq!(perf.len(), 1);
        assert_eq!(perf[0].activity, "Charge");
        assert_eq!(perf[0].count, 2);
        assert_eq!(perf[0].max_ms, 1450);
        assert!((perf[0].avg_ms - 750.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_error_events() {
        let repo = repo();
        repo.write(span("t", "Charge", 10, "STATUS_CODE_ERROR")).unwrap();
        repo.write(span("t", "Charge", 10, "OK")).unwrap();
        repo.write(TelemetryEvent::log(
            "t",
            now_utc(),
            LogPayload {
                message: "payment failed".into(),
                severity: "ERROR".into(),
                error: Some("card declined".into()),
                ..LogPayload::default()
            },
        ))
        .unwrap();
        repo.flush().unwrap();

        let errors = repo.error_events(10).unwrap();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.kind() != EventKind::Metric));
    }

    #[test]
    fn test_prune_removes_only_old_rows() {
        let repo = repo();
        let mut old = span("t", "A", 1, "OK");
        old.timestamp = now_utc() - chrono::Duration::days(2);
        repo.write(old).unwrap();
        repo.write(span("t", "A", 1, "OK")).unwrap();
        repo.flush().unwrap();

        assert_eq!(repo.prune_older_than(Duration::from_secs(60)).unwrap(), 1);
        assert_eq!(repo.by_trace_id("t").unwrap().len(), 1);
    }

    #[test]
    fn test_non_finite_metric_is_rejected_and_trace_stays_readable() {
        let repo = repo();
        let metric = |value: f64| {
            TelemetryEvent::metric(
                "t-nan",
                now_utc(),
                MetricPayload {
                    metric_name: "queue_depth".to_string(),
                    metric_value: value,
                    ..MetricPayload::default()
                },
            )
        };
        repo.write(metric(1.0)).unwrap();
        assert!(matches!(
            repo.write(metric(f64::NAN)),
            Err(StorageError::InvalidValue { column: "payload", .. })
        ));
        assert_eq!(repo.pending_len(), 1);
        repo.flush().unwrap();

        assert_eq!(repo.by_trace_id("t-nan").unwrap().len(), 1);
        assert_eq!(repo.by_event_type(EventKind::Metric).unwrap().len(), 1);
        assert!(repo.error_events(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let repo = repo();
        repo.write(span("t", "A", 1, "OK")).unwrap();
        repo.close().await.unwrap();
        repo.close().await.unwrap();
        assert!(repo.is_closed());
        assert!(matches!(
            repo.write(span("t", "A", 1, "OK")),
            Err(StorageError::Closed)
        ));
    }
}
