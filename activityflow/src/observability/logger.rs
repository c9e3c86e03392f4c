//! Logger configuration, subscriber installation and persisted activity logging.

use super::log_record::{LogLevel, LogRecord};
use crate::errors::{StorageError, TelemetryError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Output format of the diagnostic log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable text.
    Text,
}

/// Explicit logger configuration passed to constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Minimum level for both diagnostics and persisted records.
    #[serde(default)]
    pub level: LogLevel,
    /// Diagnostic output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl LoggerConfig {
    /// Creates a config with the given level and the default format.
    #[must_use]
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            format: LogFormat::default(),
        }
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Returns true if a record at `level` should be emitted.
    #[must_use]
    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.level
    }
}

/// Installs the global `tracing` subscriber described by `config`.
///
/// `RUST_LOG` takes precedence over the configured level when set.
/// Fails instead of panicking when a subscriber is already installed.
pub fn init_subscriber(config: &LoggerConfig) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?,
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()?,
    }
    Ok(())
}

/// Destination for persisted log records.
#[cfg_attr(test, mockall::automock)]
pub trait LogSink: Send + Sync {
    /// Accepts one record.
    fn write_log(&self, record: LogRecord) -> Result<(), StorageError>;
}

/// Writes activity log records to an optional sink, honoring the configured level.
///
/// Sink failures are reported through `tracing` and never surface to callers.
#[derive(Clone, Default)]
pub struct ActivityLogger {
    config: LoggerConfig,
    sink: Option<Arc<dyn LogSink>>,
}

impl ActivityLogger {
    /// Creates a logger without persistence.
    #[must_use]
    pub fn new(config: LoggerConfig) -> Self {
        Self { config, sink: None }
    }

    /// Attaches a sink for persistence.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &LoggerConfig {
        &self.config
    }

    /// Returns true if records are persisted.
    #[must_use]
    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// Persists a record if its level is enabled and a sink is attached.
    pub fn write(&self, record: LogRecord) {
        if !self.config.enabled(record.level) {
            return;
        }
        let Some(sink) = &self.sink else {
            return;
        };
        let trace_id = record.trace_id.clone();
        if let Err(e) = sink.write_log(record) {
            warn!(trace_id = %trace_id, error = %e, "Failed to persist log record");
        }
    }
}

impl std::fmt::Debug for ActivityLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityLogger")
            .field("config", &self.config)
            .field("has_sink", &self.has_sink())
            .finish()
    }
}
