//! Error types for the activityflow framework.
//!
//! Every activity failure is carried as an [`ActivityError`], which pairs a
//! retry-relevant [`ErrorKind`] with a stable code and an optional cause.
//! Storage, receiver and configuration failures have their own enums.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Shared, type-erased error used as the cause of an [`ActivityError`].
pub type BoxError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for activity invocations.
pub type ActivityResult<T = Vec<u8>> = Result<T, ActivityError>;

/// Failure classification that drives retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Temporary failure; the operation may succeed if retried.
    Transient,
    /// Failure that will not go away by retrying.
    Permanent,
    /// The operation exceeded its deadline. Retryable.
    Timeout,
}

impl ErrorKind {
    /// Returns true if an error of this kind may be retried.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Transient | Self::Timeout)
    }

    /// Returns the string form used in logs and metrics labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Well-known error codes produced by the pipeline itself.
pub mod codes {
    /// The timeout guard fired before the activity finished.
    pub const ACTIVITY_TIMEOUT: &str = "ACTIVITY_TIMEOUT";
    /// The invocation was cancelled by its caller.
    pub const ACTIVITY_CANCELLED: &str = "ACTIVITY_CANCELLED";
    /// No activity is registered under the requested name.
    pub const ACTIVITY_NOT_FOUND: &str = "ACTIVITY_NOT_FOUND";
    /// The circuit breaker for the activity is open.
    pub const CIRCUIT_BREAKER_OPEN: &str = "CIRCUIT_BREAKER_OPEN";
    /// An error that has not been through a classifier yet.
    pub const UNCLASSIFIED: &str = "UNCLASSIFIED";
    /// The activity task panicked or was aborted.
    pub const ACTIVITY_ABORTED: &str = "ACTIVITY_ABORTED";
}

/// A classified activity failure.
///
/// The kind is fixed at construction. Errors built through [`ActivityError::raw`]
/// (or the `From` conversions) are *unclassified*: they default to
/// [`ErrorKind::Permanent`] until a classifier decides otherwise.
#[derive(Clone)]
pub struct ActivityError {
    kind: ErrorKind,
    code: String,
    message: String,
    cause: Option<BoxError>,
    classified: bool,
}

impl ActivityError {
    fn build(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            cause: None,
            classified: true,
        }
    }

    /// Creates a transient (retryable) error.
    #[must_use]
    pub fn transient(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(ErrorKind::Transient, code, message)
    }

    /// Creates a permanent (non-retryable) error.
    #[must_use]
    pub fn permanent(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(ErrorKind::Permanent, code, message)
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(ErrorKind::Timeout, code, message)
    }

    /// Creates the error returned when an invocation is cancelled.
    #[must_use]
    pub fn cancelled(reason: Option<String>) -> Self {
        let message = reason.map_or_else(
            || "activity invocation cancelled".to_string(),
            |r| format!("activity invocation cancelled: {r}"),
        );
        Self::permanent(codes::ACTIVITY_CANCELLED, message)
    }

    /// Wraps an arbitrary error without classifying it.
    pub fn raw<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            kind: ErrorKind::Permanent,
            code: codes::UNCLASSIFIED.to_string(),
            message: error.to_string(),
            cause: Some(Arc::new(error)),
            classified: false,
        }
    }

    /// Attaches a cause.
    #[must_use]
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// Attaches an already shared cause.
    #[must_use]
    pub fn with_shared_cause(mut self, cause: BoxError) -> Self {
        self.cause = Some(cause);
        self
    }

    /// Returns the classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the stable error code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the underlying cause, if any.
    #[must_use]
    pub fn cause(&self) -> Option<&BoxError> {
        self.cause.as_ref()
    }

    /// Returns true once a classifier (or an explicit constructor) assigned the kind.
    #[must_use]
    pub const fn is_classified(&self) -> bool {
        self.classified
    }

    /// Returns true for transient errors.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Transient
    }

    /// Returns true for permanent errors.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        self.kind == ErrorKind::Permanent
    }

    /// Returns true for timeout errors.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::Timeout
    }

    /// Returns true if a retry may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Finds the first cause in the chain of the given concrete type.
    #[must_use]
    pub fn find_cause<T>(&self) -> Option<&T>
    where
        T: std::error::Error + 'static,
    {
        let mut current: Option<&(dyn std::error::Error + 'static)> =
            self.cause.as_deref().map(|c| c as &(dyn std::error::Error + 'static));
        while let Some(err) = current {
            if let Some(found) = err.downcast_ref::<T>() {
                return Some(found);
            }
            current = err.source();
        }
        None
    }

    /// Marks an unclassified error as classified, keeping its default kind.
    #[must_use]
    pub(crate) fn into_classified(mut self) -> Self {
        self.classified = true;
        self
    }
}

impl fmt::Display for ActivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "[{}] {}: {}", self.code, self.message, cause),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

impl fmt::Debug for ActivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityError")
            .field("kind", &self.kind)
            .field("code", &self.code)
            .field("message", &self.message)
            .field("cause", &self.cause.as_ref().map(ToString::to_string))
            .field("classified", &self.classified)
            .finish()
    }
}

impl std::error::Error for ActivityError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|c| c as &(dyn std::error::Error + 'static))
    }
}

impl From<tonic::Status> for ActivityError {
    fn from(status: tonic::Status) -> Self {
        Self::raw(status)
    }
}

impl From<anyhow::Error> for ActivityError {
    fn from(error: anyhow::Error) -> Self {
        let message = error.to_string();
        let cause: Box<dyn std::error::Error + Send + Sync + 'static> = error.into();
        Self {
            kind: ErrorKind::Permanent,
            code: codes::UNCLASSIFIED.to_string(),
            message,
            cause: Some(Arc::from(cause)),
            classified: false,
        }
    }
}

impl From<std::io::Error> for ActivityError {
    fn from(error: std::io::Error) -> Self {
        Self::raw(error)
    }
}

/// Errors raised by the event repositories.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The repository was closed; the write was rejected.
    #[error("repository is closed")]
    Closed,

    /// An SQLite operation failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A record could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value could not be decoded.
    #[error("invalid stored value in column {column}: {detail}")]
    InvalidValue {
        /// Column name.
        column: &'static str,
        /// What was wrong with it.
        detail: String,
    },

    /// IO error while preparing the database location.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The background flush task failed to join.
    #[error("flush task failed: {0}")]
    FlushTask(String),
}

/// Errors raised by configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration document could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is outside its allowed range.
    #[error("invalid configuration value for {field}: {reason}")]
    Invalid {
        /// Dotted field path.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// An environment override could not be parsed.
    #[error("invalid environment override {var}={value}")]
    Env {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },

    /// IO error while reading a configuration file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Creates an invalid-value error.
    #[must_use]
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors raised while starting or stopping telemetry components.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A repository failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The tracing subscriber could not be installed.
    #[error("failed to set global subscriber: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),

    /// The Prometheus exporter could not be installed.
    #[error("failed to initialize Prometheus exporter: {0}")]
    PrometheusInit(String),

    /// The OTLP receiver failed.
    #[cfg(feature = "receiver")]
    #[error(transparent)]
    Receiver(#[from] crate::receiver::ReceiverError),

    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
