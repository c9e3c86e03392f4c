//! Telemetry events: logs, metric points and spans sharing correlation fields.

use super::attributes::{
    all_finite, string_attribute, Attributes, ACTIVITY_KEY, ORCHESTRATION_ID_KEY,
};
use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of a telemetry event, stored in the `event_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A log line.
    Log,
    /// One metric data point.
    Metric,
    /// A finished span.
    Trace,
}

impl EventKind {
    /// Returns the stored name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Metric => "metric",
            Self::Trace => "trace",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "log" => Ok(Self::Log),
            "metric" => Ok(Self::Metric),
            "trace" => Ok(Self::Trace),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

/// Payload of a log event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LogPayload {
    /// Log body.
    #[serde(rename = "msg", default)]
    pub message: String,
    /// Severity text as sent by the producer.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub severity: String,
    /// Error text, when the log describes a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Free-form attributes.
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

/// Payload of a metric event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricPayload {
    /// Metric name.
    pub metric_name: String,
    /// Value normalized to a float.
    pub metric_value: f64,
    /// Unit, if the producer sent one.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub metric_unit: String,
    /// Data point attributes.
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

/// Payload of a span event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SpanPayload {
    /// Span name.
    pub span_name: String,
    /// Span kind, e.g. `SPAN_KIND_SERVER`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub span_kind: String,
    /// Status message or symbolic status code.
    pub span_status: String,
    /// End minus start, in milliseconds.
    pub latency_ms: i64,
    /// Span attributes.
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

/// Kind-specific payload, stored as JSON in the `payload` column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    /// Log payload.
    Log(LogPayload),
    /// Metric payload.
    Metric(MetricPayload),
    /// Span payload.
    Span(SpanPayload),
}

impl EventPayload {
    /// Returns the event kind of this payload.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Log(_) => EventKind::Log,
            Self::Metric(_) => EventKind::Metric,
            Self::Span(_) => EventKind::Trace,
        }
    }

    /// Returns the payload attributes.
    #[must_use]
    pub const fn attributes(&self) -> &Attributes {
        match self {
            Self::Log(p) => &p.attributes,
            Self::Metric(p) => &p.attributes,
            Self::Span(p) => &p.attributes,
        }
    }

    /// Returns false if the payload holds a NaN or infinite number.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Metric(p) => p.metric_value.is_finite() && all_finite(&p.attributes),
            other => all_finite(other.attributes()),
        }
    }

    /// Serializes the payload to its stored JSON form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decodes a stored payload using the kind from the `event_type` column.
    pub fn from_json(kind: EventKind, json: &str) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            EventKind::Log => Self::Log(serde_json::from_str(json)?),
            EventKind::Metric => Self::Metric(serde_json::from_str(json)?),
            EventKind::Trace => Self::Span(serde_json::from_str(json)?),
        })
    }
}

/// A telemetry event with shared correlation fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryEvent {
    /// Row id, assigned by storage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Event time.
    pub timestamp: Timestamp,
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
    /// Kind-specific payload.
    pub payload: EventPayload,
}

impl TelemetryEvent {
    /// Creates an event, taking orchestration id and activity from the
    /// payload's well-known attributes when present.
    #[must_use]
    pub fn new(trace_id: impl Into<String>, timestamp: Timestamp, payload: EventPayload) -> Self {
        let attributes = payload.attributes();
        let orchestration_id = string_attribute(attributes, ORCHESTRATION_ID_KEY).map(str::to_string);
        let activity = string_attribute(attributes, ACTIVITY_KEY).map(str::to_string);
        Self {
            id: None,
            timestamp,
            trace_id: trace_id.into(),
            span_id: None,
            orchestration_id,
            activity,
            payload,
        }
    }

    /// Creates a log event.
    #[must_use]
    pub fn log(trace_id: impl Into<String>, timestamp: Timestamp, payload: LogPayload) -> Self {
        Self::new(trace_id, timestamp, EventPayload::Log(payload))
    }

    /// Creates a metric event.
    #[must_use]
    pub fn metric(trace_id: impl Into<String>, timestamp: Timestamp, payload: MetricPayload) -> Self {
        Self::new(trace_id, timestamp, EventPayload::Metric(payload))
    }

    /// Creates a span event.
    #[must_use]
    pub fn span(trace_id: impl Into<String>, timestamp: Timestamp, payload: SpanPayload) -> Self {
        Self::new(trace_id, timestamp, EventPayload::Span(payload))
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
    pub fn with_activity(mut self, activity: impl Into<String>) -> Self {
        self.activity = Some(activity.into());
        self
    }

    /// Returns the event kind.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::AttributeValue;
    use crate::utils::now_utc;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_correlation_extracted_from_attributes() {
        let mut attributes = Attributes::new();
        attributes.insert(ORCHESTRATION_ID_KEY.into(), "order-7".into());
        attributes.insert(ACTIVITY_KEY.into(), "ReserveInventory".into());

        let event = TelemetryEvent::log(
            "t1",
            now_utc(),
            LogPayload {
                message: "reserved".into(),
                severity: "INFO".into(),
                attributes,
                ..Default::default()
            },
        );

        assert_eq!(event.kind(), EventKind::Log);
        assert_eq!(event.orchestration_id.as_deref(), Some("order-7"));
        assert_eq!(event.activity.as_deref(), Some("ReserveInventory"));
    }

    #[test]
    fn test_non_string_correlation_attributes_ignored() {
        let mut attributes = Attributes::new();
        attributes.insert(ACTIVITY_KEY.into(), AttributeValue::Int(1));
        let event = TelemetryEvent::span(
            "t",
            now_utc(),
            SpanPayload {
                span_name: "s".into(),
                attributes,
                ..Default::default()
            },
        );
        assert!(event.activity.is_none());
    }

    #[test]
    fn test_log_payload_json_keys() {
        let payload = EventPayload::Log(LogPayload {
            message: "hello".into(),
            severity: "WARN".into(),
            error: Some("PAYMENT_FAILED: timeout".into()),
            attributes: Attributes::new(),
        });
        let json: serde_json::Value = serde_json::from_str(&payload.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"msg": "hello", "severity": "WARN", "error": "PAYMENT_FAILED: timeout"})
        );
    }

    #[test]
    fn test_span_payload_decodes_by_kind() {
        let payload = EventPayload::Span(SpanPayload {
            span_name: "charge".into(),
            span_kind: String::new(),
            span_status: "STATUS_CODE_UNSET".into(),
            latency_ms: 1450,
            attributes: Attributes::new(),
        });
        let json = payload.to_json().unwrap();
        let decoded = EventPayload::from_json(EventKind::Trace, &json).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_non_finite_payloads() {
        let metric = |value: f64| {
            EventPayload::Metric(MetricPayload {
                metric_name: "queue_depth".into(),
                metric_value: value,
                ..Default::default()
            })
        };
        assert!(metric(3.0).is_finite());
        assert!(!metric(f64::NAN).is_finite());
        assert!(!metric(f64::NEG_INFINITY).is_finite());

        let mut attributes = Attributes::new();
        attributes.insert("ratio".into(), f64::NAN.into());
        let log = EventPayload::Log(LogPayload {
            attributes,
            ..Default::default()
        });
        assert!(!log.is_finite());
    }

    #[test]
    fn test_event_kind_parsing() {
        assert_eq!("metric".parse::<EventKind>().unwrap(), EventKind::Metric);
        assert!("span".parse::<EventKind>().is_err());
    }
}
