//! Observability utilities: persisted log records, logger configuration,
//! metrics and span timing.

mod log_record;
mod logger;
pub mod metrics;
mod timing;

pub use log_record::{hash_data, hash_error, LogLevel, LogRecord, ParseLogLevelError};
pub use logger::{init_subscriber, ActivityLogger, LogFormat, LogSink, LoggerConfig};
pub use timing::SpanTimer;

#[cfg(test)]
pub(crate) use logger::MockLogSink;
