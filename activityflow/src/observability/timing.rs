//! Timing helpers for spans around activity invocations.

use std::time::Duration;
use tokio::time::Instant;

/// Measures the wall-clock time of a named span.
///
/// Uses the tokio clock so paused-time tests observe virtual durations.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the span and returns its duration.
    #[must_use]
    pub fn finish(self) -> Duration {
        self.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_span_timer_measures_virtual_time() {
        let timer = SpanTimer::start("charge");
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(timer.name(), "charge");
        assert!(timer.elapsed_ms() >= 250.0);
        assert!(timer.finish() >= Duration::from_millis(250));
    }
}
