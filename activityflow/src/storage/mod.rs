//! SQLite persistence for activity logs and telemetry events.
//!
//! Both repositories buffer writes and persist them in one transaction when
//! the batch fills, when the periodic flush fires, or on close.

mod batch;
mod event_repository;
mod log_repository;
mod schema;
mod stats;

pub use batch::{BatchRecord, BatchedRepository, RepositoryConfig, IN_MEMORY, MAX_FLUSH_ATTEMPTS};
pub use event_repository::{TaskEventRepository, MAX_EVENT_TYPE_ROWS};
pub use log_repository::{LogRepository, MAX_ERROR_ROWS};
pub use schema::{LOGS_SCHEMA, TASK_EVENTS_SCHEMA};
pub use stats::{ActivityStats, ErrorFrequency};
