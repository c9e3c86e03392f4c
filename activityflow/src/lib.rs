//! # Activityflow
//!
//! Resilient activity execution with batched telemetry capture.
//!
//! Activityflow wraps unit-of-work functions ("activities") in a chain of
//! interceptors and records what happened:
//!
//! - **Error classification**: every failure is transient, permanent or a
//!   timeout; gRPC status codes are mapped to retry decisions
//! - **Retry with backoff**: exponential backoff with optional jitter, only
//!   for retryable failures
//! - **Timeout guard**: one deadline bounds an invocation, retries included
//! - **Circuit breaker**: per-activity breakers shed load from failing
//!   dependencies
//! - **Batched storage**: logs and telemetry events are buffered and written
//!   to SQLite in transactional batches, with correlation and analytics queries
//! - **OTLP receiver**: ingests logs, metrics and traces over gRPC
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use activityflow::prelude::*;
//!
//! let telemetry = Telemetry::start(&config).await?;
//! let mut registry = ActivityRegistry::new(telemetry.activity_deps(&config));
//! registry.register("payment:charge", activity_fn(|ctx, input| async move {
//!     charge(&ctx, input).await
//! }))?;
//!
//! let output = registry
//!     .invoke("payment:charge", ActivityContext::new("checkout"), payload)
//!     .await?;
//! telemetry.shutdown().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod activities;
pub mod cancellation;
pub mod classification;
pub mod config;
pub mod context;
pub mod errors;
pub mod events;
pub mod interceptors;
pub mod observability;
pub mod pipeline;
#[cfg(feature = "receiver")]
pub mod receiver;
pub mod storage;
pub mod telemetry;
pub mod testing;
pub mod utils;


/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::activities::{activity_fn, Activity, ActivityDeps, ActivityRegistry};
    pub use crate::cancellation::CancellationToken;
    pub use crate::classification::{ErrorClassifier, GrpcErrorClassifier};
    pub use crate::config::Config;
    pub use crate::context::ActivityContext;
    pub use crate::errors::{codes, ActivityError, ActivityResult, ErrorKind};
    pub use crate::events::{EventSink, TelemetryEvent};
    pub use crate::interceptors::{
        BreakerConfig, CircuitBreakerRegistry, Interceptor, JitterStrategy, RetryPolicy,
    };
    pub use crate::observability::{ActivityLogger, LogLevel, LogRecord, LoggerConfig};
    pub use crate::pipeline::{ActivityPipeline, PipelineBuilder};
    pub use crate::storage::{LogRepository, RepositoryConfig, TaskEventRepository};
    pub use crate::telemetry::Telemetry;
    pub use crate::utils::{generate_trace_id, Timestamp};
}
