//! Persisted log records and content fingerprints.

use crate::errors::ActivityError;
use crate::utils::{now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Severity of a persisted log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Verbose diagnostics.
    Debug,
    /// Normal operation.
    #[default]
    Info,
    /// Something unexpected that did not fail the invocation.
    Warn,
    /// A failed invocation.
    Error,
}

impl LogLevel {
    /// Returns the lowercase name stored in the `level` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown level name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level: {0}")]
pub struct ParseLogLevelError(pub String);

impl FromStr for LogLevel {
    type Err = ParseLogLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" | "trace" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" | "fatal" => Ok(Self::Error),
            _ => Err(ParseLogLevelError(s.to_string())),
        }
    }
}

/// A structured log entry destined for the `logs` table.
///
/// Payloads are never stored; only their SHA-256 fingerprints are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Row id, assigned by storage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Creation time.
    pub timestamp: Timestamp,
    /// Severity.
    pub level: LogLevel,
    /// Correlation trace id.
    pub trace_id: String,
    /// Span id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    /// Orchestration id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orchestration_id: Option<String>,
    /// Activity name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
    /// Log message.
    pub message: String,
    /// Execution duration in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    /// SHA-256 of the input payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_hash: Option<String>,
    /// SHA-256 of the output payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_hash: Option<String>,
    /// Serialized error text.
    #[serde(rename = "error", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Grouping hash of the error code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_hash: Option<String>,
}

impl LogRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(level: LogLevel, trace_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: None,
            timestamp: now_utc(),
            level,
            trace_id: trace_id.into(),
            span_id: None,
            orchestration_id: None,
            activity: None,
            message: message.into(),
            duration_ms: None,
            input_hash: None,
            output_hash: None,
            error_message: None,
            error_hash: None,
        }
    }

    /// Overrides the timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Sets the span id.
    #[must_use]
    pub fn with_span_id(mut self, span_id: impl Into<String>) -> Self {
        self.span_id = Some(span_id.into());
        self
    }

    /// Sets the orchestration id.
    #[must_use]
    pub fn with_orchestration_id(mut self, id: impl Into<String>) -> Self {
        self.orchestration_id = Some(id.into());
        self
    }

    /// Sets the activity name.
    #[must_use]
    pub fn with_activity(mut self, name: impl Into<String>) -> Self {
        self.activity = Some(name.into());
        self
    }

    /// Sets the execution duration, truncated to milliseconds.
    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = Some(i64::try_from(duration.as_millis()).unwrap_or(i64::MAX));
        self
    }

    /// Fingerprints the input payload. Empty payloads are not hashed.
    #[must_use]
    pub fn with_input(mut self, data: &[u8]) -> Self {
        if !data.is_empty() {
            self.input_hash = Some(hash_data(data));
        }
        self
    }

    /// Fingerprints the output payload. Empty payloads are not hashed.
    #[must_use]
    pub fn with_output(mut self, data: &[u8]) -> Self {
        if !data.is_empty() {
            self.output_hash = Some(hash_data(data));
        }
        self
    }

    /// Records an error message and its grouping hash.
    #[must_use]
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        if !message.is_empty() {
            self.error_hash = Some(hash_error(&message));
            self.error_message = Some(message);
        }
        self
    }

    /// Records a classified error, grouping on its code.
    #[must_use]
    pub fn with_activity_error(mut self, error: &ActivityError) -> Self {
        self.error_message = Some(error.to_string());
        self.error_hash = Some(hash_error(error.code()));
        self
    }

    /// Serializes the record to JSON, as stored in the `raw_json` column.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Returns the hex SHA-256 digest of `data`.
#[must_use]
pub fn hash_data(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Returns a 16 hex character grouping hash of an error message.
///
/// Only the code token before the first `:` is hashed, so messages that
/// differ in their detail group together. Empty input yields an empty string.
#[must_use]
pub fn hash_error(message: &str) -> String {
    if message.is_empty() {
        return String::new();
    }
    let code = message.split_once(':').map_or(message, |(code, _)| code);
    let digest = Sha256::digest(code.as_bytes());
    hex::encode(&digest[..8])
}
