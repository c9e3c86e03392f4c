//! Event sink trait and implementations.

use super::TelemetryEvent;
use crate::errors::StorageError;
use parking_lot::RwLock;
use tracing::debug;

/// Destination for telemetry events.
///
/// Writes are synchronous: implementations buffer and may flush inline.
pub trait EventSink: Send + Sync {
    /// Accepts one event.
    fn write_event(&self, event: TelemetryEvent) -> Result<(), StorageError>;
}

/// A sink that discards all events after logging them at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn write_event(&self, event: TelemetryEvent) -> Result<(), StorageError> {
        debug!(
            event_type = %event.kind(),
            trace_id = %event.trace_id,
            "Discarding telemetry event"
        );
        Ok(())
    }
}

/// A collecting event sink for testing purposes.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<TelemetryEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl EventSink for CollectingEventSink {
    fn write_event(&self, event: TelemetryEvent) -> Result<(), StorageError> {
        self.events.write().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{LogPayload, MetricPayload};
    use crate::utils::now_utc;

    #[test]
    fn test_noop_sink() {
        let sink = NoOpEventSink;
        assert!(sink
            .write_event(TelemetryEvent::log("t", now_utc(), LogPayload::default()))
            .is_ok());
    }

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.write_event(TelemetryEvent::log("t1", now_utc(), LogPayload::default()))
            .unwrap();
        sink.write_event(TelemetryEvent::metric(
            "t2",
            now_utc(),
            MetricPayload {
                metric_name: "queue_depth".into(),
                metric_value: 3.0,
                ..Default::default()
            },
        ))
        .unwrap();

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.events()[1].trace_id, "t2");

        sink.clear();
        assert!(sink.is_empty());
    }
}
