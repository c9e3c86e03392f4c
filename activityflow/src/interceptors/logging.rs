//! Logging stage: records start and outcome of every invocation.

use super::{Interceptor, Next};
use crate::context::ActivityContext;
use crate::errors::ActivityResult;
use crate::observability::{metrics, ActivityLogger, LogLevel, LogRecord, SpanTimer};
use async_trait::async_trait;
use tracing::{error, info};

/// Priority of the logging stage: outermost.
pub const LOGGING_PRIORITY: i32 = -100;

/// Interceptor that persists a start and an outcome [`LogRecord`] per
/// invocation and records activity metrics.
///
/// The measured duration covers every inner stage, retries included.
#[derive(Debug, Clone, Default)]
pub struct LoggingInterceptor {
    logger: ActivityLogger,
}

impl LoggingInterceptor {
    /// Creates a logging stage writing through `logger`.
    #[must_use]
    pub const fn new(logger: ActivityLogger) -> Self {
        Self { logger }
    }

    /// Returns the logger.
    #[must_use]
    pub const fn logger(&self) -> &ActivityLogger {
        &self.logger
    }
}

fn base_record(ctx: &ActivityContext, level: LogLevel, message: &str) -> LogRecord {
    let record = LogRecord::new(level, ctx.trace_id(), message)
        .with_span_id(ctx.span_id())
        .with_activity(ctx.activity());
    match ctx.orchestration_id() {
        Some(id) => record.with_orchestration_id(id),
        None => record,
    }
}

#[async_trait]
impl Interceptor for LoggingInterceptor {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn priority(&self) -> i32 {
        LOGGING_PRIORITY
    }

    async fn intercept(&self, ctx: ActivityContext, input: Vec<u8>, next: Next) -> ActivityResult {
        let timer = SpanTimer::start(ctx.activity());
        let started = base_record(&ctx, LogLevel::Info, "activity started").with_input(&input);
        let input_hash = started.input_hash.clone();
        self.logger.write(started);
        info!(
            activity = %ctx.activity(),
            trace_id = %ctx.trace_id(),
            input_bytes = input.len(),
            "Activity started"
        );

        let result = next.run(ctx.clone(), input).await;
        let duration = timer.finish();
        let duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);

        let mut outcome = match &result {
            Ok(output) => {
                info!(
                    activity = %ctx.activity(),
                    trace_id = %ctx.trace_id(),
                    duration_ms,
                    output_bytes = output.len(),
                    "Activity completed"
                );
                metrics::record_activity_execution(ctx.activity(), duration, None);
                base_record(&ctx, LogLevel::Info, "activity completed").with_output(output)
            }
            Err(e) => {
                error!(
                    activity = %ctx.activity(),
                    trace_id = %ctx.trace_id(),
                    duration_ms,
                    kind = %e.kind(),
                    code = %e.code(),
                    error = %e,
                    "Activity failed"
                );
                metrics::record_activity_execution(ctx.activity(), duration, Some(e.kind().as_str()));
                base_record(&ctx, LogLevel::Error, "activity failed").with_activity_error(e)
            }
        }
        .with_duration(duration);
        outcome.input_hash = input_hash;
        self.logger.write(outcome);

        result
    }
}
