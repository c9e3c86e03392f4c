//! Telemetry event model and sinks.
//!
//! Events are produced by the OTLP receiver and stored by the task event
//! repository. Each event carries one of three payload kinds plus shared
//! correlation fields.

mod attributes;
mod event;
mod sink;

pub use attributes::{
    all_finite, string_attribute, AttributeValue, Attributes, ACTIVITY_KEY, ORCHESTRATION_ID_KEY,
    TRACE_ID_KEY,
};
pub use event::{EventKind, EventPayload, LogPayload, MetricPayload, SpanPayload, TelemetryEvent};
pub use sink::{CollectingEventSink, EventSink, NoOpEventSink};
