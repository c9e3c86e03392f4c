//! Metrics definitions and recording helpers.
//!
//! Names follow Prometheus conventions and are exposed for pull-based scraping
//! through [`install_prometheus_exporter`].

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

/// Counter: orchestrations started.
pub const ORCHESTRATION_STARTED_TOTAL: &str = "orchestration_started_total";
/// Counter: orchestrations completed successfully.
pub const ORCHESTRATION_COMPLETED_TOTAL: &str = "orchestration_completed_total";
/// Counter: orchestrations failed.
pub const ORCHESTRATION_FAILED_TOTAL: &str = "orchestration_failed_total";
/// Counter: activity invocations.
pub const ACTIVITY_EXECUTIONS_TOTAL: &str = "activity_executions_total";
/// Counter: failed activity invocations.
pub const ACTIVITY_ERRORS_TOTAL: &str = "activity_errors_total";
/// Counter: compensation runs.
pub const COMPENSATION_EXECUTIONS_TOTAL: &str = "compensation_executions_total";
/// Counter: failed compensation runs.
pub const COMPENSATION_ERRORS_TOTAL: &str = "compensation_errors_total";

/// Histogram: orchestration duration in seconds.
pub const ORCHESTRATION_DURATION: &str = "orchestration_duration_seconds";
/// Histogram: activity duration in seconds.
pub const ACTIVITY_DURATION: &str = "activity_duration_seconds";
/// Histogram: compensation duration in seconds.
pub const COMPENSATION_DURATION: &str = "compensation_duration_seconds";

/// Histogram buckets for orchestration durations, in seconds.
pub const ORCHESTRATION_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0];
/// Histogram buckets for activity durations, in seconds.
pub const ACTIVITY_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0];
/// Histogram buckets for compensation durations, in seconds.
pub const COMPENSATION_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.5, 1.0, 5.0];

/// Register all metric descriptions. Called once during telemetry initialization.
pub fn register_metrics() {
    // Counters
    describe_counter!(ORCHESTRATION_STARTED_TOTAL, "Total number of orchestrations started");
    describe_counter!(
        ORCHESTRATION_COMPLETED_TOTAL,
        "Total number of orchestrations completed successfully"
    );
    describe_counter!(ORCHESTRATION_FAILED_TOTAL, "Total number of orchestrations failed");
    describe_counter!(ACTIVITY_EXECUTIONS_TOTAL, "Total number of activity executions");
    describe_counter!(ACTIVITY_ERRORS_TOTAL, "Total number of activity errors");
    describe_counter!(
        COMPENSATION_EXECUTIONS_TOTAL,
        "Total number of compensation executions"
    );
    describe_counter!(COMPENSATION_ERRORS_TOTAL, "Total number of compensation errors");

    // Histograms
    describe_histogram!(
        ORCHESTRATION_DURATION,
        "Orchestration execution duration in seconds"
    );
    describe_histogram!(ACTIVITY_DURATION, "Activity execution duration in seconds");
    describe_histogram!(
        COMPENSATION_DURATION,
        "Compensation execution duration in seconds"
    );
}

/// Record an orchestration start
pub fn record_orchestration_started() {
    counter!(ORCHESTRATION_STARTED_TOTAL).increment(1);
}

/// Record a successful orchestration completion
pub fn record_orchestration_completed(duration: Duration) {
    counter!(ORCHESTRATION_COMPLETED_TOTAL).increment(1);
    histogram!(ORCHESTRATION_DURATION, "outcome" => "completed").record(duration.as_secs_f64());
}

/// Record an orchestration failure
pub fn record_orchestration_failed(duration: Duration) {
    counter!(ORCHESTRATION_FAILED_TOTAL).increment(1);
    histogram!(ORCHESTRATION_DURATION, "outcome" => "failed").record(duration.as_secs_f64());
}

/// Record one activity invocation; `error_kind` is set when it failed.
pub fn record_activity_execution(activity: &str, duration: Duration, error_kind: Option<&str>) {
    counter!(ACTIVITY_EXECUTIONS_TOTAL, "activity" => activity.to_string()).increment(1);
    histogram!(ACTIVITY_DURATION, "activity" => activity.to_string())
        .record(duration.as_secs_f64());
    if let Some(kind) = error_kind {
        counter!(ACTIVITY_ERRORS_TOTAL, "activity" => activity.to_string(), "error_kind" => kind.to_string())
            .increment(1);
    }
}

/// Record one compensation run
pub fn record_compensation(activity: &str, duration: Duration, failed: bool) {
    counter!(COMPENSATION_EXECUTIONS_TOTAL, "activity" => activity.to_string()).increment(1);
    histogram!(COMPENSATION_DURATION, "activity" => activity.to_string())
        .record(duration.as_secs_f64());
    if failed {
        counter!(COMPENSATION_ERRORS_TOTAL, "activity" => activity.to_string()).increment(1);
    }
}

/// Installs the global Prometheus recorder with an HTTP scrape listener.
#[cfg(feature = "prometheus")]
pub fn install_prometheus_exporter(
    addr: std::net::SocketAddr,
) -> Result<(), crate::errors::TelemetryError> {
    use crate::errors::TelemetryError;
    use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};

    let mut builder = PrometheusBuilder::new().with_http_listener(addr);
    for (name, buckets) in [
        (ORCHESTRATION_DURATION, ORCHESTRATION_BUCKETS),
        (ACTIVITY_DURATION, ACTIVITY_BUCKETS),
        (COMPENSATION_DURATION, COMPENSATION_BUCKETS),
    ] {
        builder = builder
            .set_buckets_for_metric(Matcher::Full(name.to_string()), buckets)
            .map_err(|e| TelemetryError::PrometheusInit(e.to_string()))?;
    }
    builder
        .install()
        .map_err(|e| TelemetryError::PrometheusInit(e.to_string()))?;

    register_metrics();
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use metrics_util::debugging::{DebugValue, Snapshot};

    /// Flattens a snapshot into `(metric name, value)` pairs.
    pub fn collect(snapshot: Snapshot) -> Vec<(String, DebugValue)> {
        snapshot
            .into_vec()
            .into_iter()
            .map(|(key, _, _, value)| (key.key().name().to_string(), value))
            .collect()
    }

    /// Sums counter values with the given name across all label sets.
    pub fn counter_total(entries: &[(String, DebugValue)], name: &str) -> u64 {
        entries
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, value)| match value {
                DebugValue::Counter(c) => *c,
                _ => panic!("Expected counter"),
            })
            .sum()
    }

    /// Counts histogram samples with the given name across all label sets.
    pub fn histogram_samples(entries: &[(String, DebugValue)], name: &str) -> usize {
        entries
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, value)| match value {
                DebugValue::Histogram(h) => h.len(),
                _ => panic!("Expected histogram"),
            })
            .sum()
    }
}
