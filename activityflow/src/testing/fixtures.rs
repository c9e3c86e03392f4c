//! Repository and record fixtures.

use std::path::Path;
use std::sync::Arc;

use crate::errors::StorageError;
use crate::events::{SpanPayload, TelemetryEvent};
use crate::observability::{ActivityLogger, LogLevel, LogRecord, LoggerConfig};
use crate::storage::{LogRepository, RepositoryConfig, TaskEventRepository};
use crate::utils::now_utc;

/// A log repository and a task event repository opened together.
pub struct TestRepositories {
    /// Log repository.
    pub logs: Arc<LogRepository>,
    /// Task event repository.
    pub events: Arc<TaskEventRepository>,
}

impl TestRepositories {
    /// Opens both repositories on private in-memory databases.
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::open(&RepositoryConfig::in_memory(), &RepositoryConfig::in_memory())
    }

    /// Opens both repositories as files under `dir`.
    pub fn in_dir(dir: &Path) -> Result<Self, StorageError> {
        Self::open(
            &RepositoryConfig::new(dir.join("logs.db")),
            &RepositoryConfig::new(dir.join("events.db")),
        )
    }

    /// Opens both repositories with explicit configs.
    pub fn open(logs: &RepositoryConfig, events: &RepositoryConfig) -> Result<Self, StorageError> {
        Ok(Self {
            logs: Arc::new(LogRepository::open(logs)?),
            events: Arc::new(TaskEventRepository::open(events)?),
        })
    }

    /// Returns a logger at `level` persisting into the log repository.
    #[must_use]
    pub fn logger(&self, level: LogLevel) -> ActivityLogger {
        ActivityLogger::new(LoggerConfig::new(level)).with_sink(self.logs.clone())
    }

    /// Flushes both repositories.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.logs.flush()?;
        self.events.flush()?;
        Ok(())
    }

    /// Closes both repositories.
    pub async fn close(&self) -> Result<(), StorageError> {
        self.logs.close().await?;
        self.events.close().await
    }
}

impl std::fmt::Debug for TestRepositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestRepositories")
            .field("pending_logs", &self.logs.pending_len())
            .field("pending_events", &self.events.pending_len())
            .finish()
    }
}

/// Builds an info record for `activity` in `trace_id`.
#[must_use]
pub fn log_record(trace_id: &str, activity: &str, message: &str) -> LogRecord {
    LogRecord::new(LogLevel::Info, trace_id, message).with_activity(activity)
}

/// Builds a span event for `activity` timestamped now.
#[must_use]
pub fn span_event(trace_id: &str, activity: &str, latency_ms: i64, status: &str) -> TelemetryEvent {
    TelemetryEvent::span(
        trace_id,
        now_utc(),
        SpanPayload {
            span_name: activity.to_string(),
            span_status: status.to_string(),
            latency_ms,
            ..SpanPayload::default()
        },
    )
    .with_activity(activity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn test_in_memory_repositories() {
        let repos = TestRepositories::in_memory().unwrap();
        repos
            .logger(LogLevel::Debug)
            .write(log_record("t-1", "payment:charge", "charged"));
        repos
            .events
            .write(span_event("t-1", "payment:charge", 120, "OK"))
            .unwrap();
        repos.flush().unwrap();

        let logs = repos.logs.by_trace_id("t-1").unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].activity.as_deref(), Some("payment:charge"));

        let events = repos.events.by_trace_id("t-1").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), EventKind::Trace);
        assert_eq!(events[0].activity.as_deref(), Some("payment:charge"));

        repos.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_repositories() {
        let dir = tempfile::tempdir().unwrap();
        let repos = TestRepositories::in_dir(dir.path()).unwrap();
        assert!(dir.path().join("logs.db").exists());
        assert!(dir.path().join("events.db").exists());
        repos.close().await.unwrap();
    }
}
