//! Conversion of OTLP messages into telemetry events.

use crate::events::{
    string_attribute, AttributeValue, Attributes, LogPayload, MetricPayload, SpanPayload,
    TelemetryEvent, TRACE_ID_KEY,
};
use crate::utils::{encode_wire_id, from_unix_nanos, now_utc};
use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, KeyValue};
use opentelemetry_proto::tonic::logs::v1::{LogRecord, SeverityNumber};
use opentelemetry_proto::tonic::metrics::v1::{metric, number_data_point, Metric, NumberDataPoint};
use opentelemetry_proto::tonic::trace::v1::{span, status, Span};
use tracing::warn;

/// Trace id used when a record carries none.
pub const UNKNOWN_TRACE_ID: &str = "unknown";

/// Span status used when a span carries no status at all.
pub const DEFAULT_SPAN_STATUS: &str = "OK";

const ERROR_ATTRIBUTE_KEYS: [&str; 2] = ["error", "exception.message"];

/// Converts an OTLP value. Empty values and NaN or infinite doubles yield `None`.
#[must_use]
pub fn any_value_to_attribute(value: &AnyValue) -> Option<AttributeValue> {
    let converted = match value.value.as_ref()? {
        any_value::Value::StringValue(s) => AttributeValue::String(s.clone()),
        any_value::Value::BoolValue(b) => AttributeValue::Bool(*b),
        any_value::Value::IntValue(i) => AttributeValue::Int(*i),
        any_value::Value::DoubleValue(d) if !d.is_finite() => {
            warn!(value = %d, "Dropping non-finite attribute value");
            return None;
        }
        any_value::Value::DoubleValue(d) => AttributeValue::Double(*d),
        any_value::Value::BytesValue(bytes) => AttributeValue::String(hex::encode(bytes)),
        any_value::Value::ArrayValue(array) => AttributeValue::Array(
            array
                .values
                .iter()
                .filter_map(any_value_to_attribute)
                .collect(),
        ),
        any_value::Value::KvlistValue(list) => AttributeValue::Map(attributes_from(&list.values)),
    };
    Some(converted)
}

/// Converts OTLP key/values into an attribute map. Valueless keys are dropped.
#[must_use]
pub fn attributes_from(key_values: &[KeyValue]) -> Attributes {
    key_values
        .iter()
        .filter_map(|kv| {
            kv.value
                .as_ref()
                .and_then(any_value_to_attribute)
                .map(|v| (kv.key.clone(), v))
        })
        .collect()
}

fn trace_id_from_attributes(attributes: &Attributes) -> String {
    string_attribute(attributes, TRACE_ID_KEY)
        .unwrap_or(UNKNOWN_TRACE_ID)
        .to_string()
}

fn resolve_trace_id(wire: &[u8], attributes: &Attributes) -> String {
    encode_wire_id(wire).unwrap_or_else(|| trace_id_from_attributes(attributes))
}

fn body_text(body: Option<&AnyValue>) -> String {
    match body.and_then(any_value_to_attribute) {
        Some(AttributeValue::String(s)) => s,
        Some(other) => serde_json::to_string(&other).unwrap_or_default(),
        None => String::new(),
    }
}

fn severity_text(record: &LogRecord) -> String {
    if !record.severity_text.is_empty() {
        return record.severity_text.clone();
    }
    match SeverityNumber::try_from(record.severity_number) {
        Ok(SeverityNumber::Unspecified) | Err(_) => String::new(),
        Ok(number) => number.as_str_name().to_string(),
    }
}

/// Converts one OTLP log record.
///
/// The timestamp falls back to now when unset; trace and span ids are
/// hex-encoded.
#[must_use]
pub fn log_record_to_event(record: &LogRecord) -> TelemetryEvent {
    let attributes = attributes_from(&record.attributes);
    let timestamp = from_unix_nanos(record.time_unix_nano).unwrap_or_else(now_utc);
    let trace_id = resolve_trace_id(&record.trace_id, &attributes);
    let error = ERROR_ATTRIBUTE_KEYS
        .iter()
        .find_map(|key| string_attribute(&attributes, key))
        .map(str::to_string);

    let payload = LogPayload {
        message: body_text(record.body.as_ref()),
        severity: severity_text(record),
        error,
        attributes,
    };
    let event = TelemetryEvent::log(trace_id, timestamp, payload);
    match encode_wire_id(&record.span_id) {
        Some(span_id) => event.with_span_id(span_id),
        None => event,
    }
}

#[allow(clippy::cast_precision_loss)]
fn number_value(point: &NumberDataPoint) -> f64 {
    match point.value {
        Some(number_data_point::Value::AsInt(i)) => i as f64,
        Some(number_data_point::Value::AsDouble(d)) => d,
        None => 0.0,
    }
}

fn metric_event(
    metric: &Metric,
    name: String,
    value: f64,
    time_unix_nano: u64,
    key_values: &[KeyValue],
) -> TelemetryEvent {
    let attributes = attributes_from(key_values);
    let trace_id = trace_id_from_attributes(&attributes);
    let timestamp = from_unix_nanos(time_unix_nano).unwrap_or_else(now_utc);
    TelemetryEvent::metric(
        trace_id,
        timestamp,
        MetricPayload {
            metric_name: name,
            metric_value: value,
            metric_unit: metric.unit.clone(),
            attributes,
        },
    )
}

/// Converts one OTLP metric into one event per data point.
///
/// Sums and gauges keep their name; histograms contribute their count as
/// `<name>_count`. Other metric types are ignored, as are NaN or infinite
/// data points.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn metric_to_events(metric: &Metric) -> Vec<TelemetryEvent> {
    let number_points = |points: &[NumberDataPoint]| -> Vec<TelemetryEvent> {
        points
            .iter()
            .filter_map(|p| {
                let value = number_value(p);
                if !value.is_finite() {
                    warn!(metric = %metric.name, %value, "Dropping non-finite data point");
                    return None;
                }
                Some(metric_event(
                    metric,
                    metric.name.clone(),
                    value,
                    p.time_unix_nano,
                    &p.attributes,
                ))
            })
            .collect()
    };

    match &metric.data {
        Some(metric::Data::Sum(sum)) => number_points(&sum.data_points),
        Some(metric::Data::Gauge(gauge)) => number_points(&gauge.data_points),
        Some(metric::Data::Histogram(histogram)) => histogram
            .data_points
            .iter()
            .map(|p| {
                metric_event(
                    metric,
                    format!("{}_count", metric.name),
                    p.count as f64,
                    p.time_unix_nano,
                    &p.attributes,
                )
            })
            .collect(),
        Some(_) | None => Vec::new(),
    }
}

fn nanos_to_millis(nanos: u64) -> i64 {
    i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
}

fn span_status(span: &Span) -> String {
    let Some(status) = &span.status else {
        return DEFAULT_SPAN_STATUS.to_string();
    };
    if !status.message.is_empty() {
        return status.message.clone();
    }
    status::StatusCode::try_from(status.code).map_or_else(
        |_| format!("STATUS_CODE_{}", status.code),
        |code| code.as_str_name().to_string(),
    )
}

fn span_kind(span: &Span) -> String {
    match span::SpanKind::try_from(span.kind) {
        Ok(span::SpanKind::Unspecified) | Err(_) => String::new(),
        Ok(kind) => kind.as_str_name().to_string(),
    }
}

/// Converts one OTLP span.
///
/// The event is stamped with the end time; latency is end minus start in
/// whole milliseconds, never negative.
#[must_use]
pub fn span_to_event(span: &Span) -> TelemetryEvent {
    let attributes = attributes_from(&span.attributes);
    let timestamp = from_unix_nanos(span.end_time_unix_nano).unwrap_or_else(now_utc);
    let latency_ms =
        (nanos_to_millis(span.end_time_unix_nano) - nanos_to_millis(span.start_time_unix_nano)).max(0);
    let trace_id = resolve_trace_id(&span.trace_id, &attributes);

    let payload = SpanPayload {
        span_name: span.name.clone(),
        span_kind: span_kind(span),
        span_status: span_status(span),
        latency_ms,
        attributes,
    };
    let event = TelemetryEvent::span(trace_id, timestamp, payload);
    match encode_wire_id(&span.span_id) {
        Some(span_id) => event.with_span_id(span_id),
        None => event,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventKind, EventPayload};
    use opentelemetry_proto::tonic::common::v1::{ArrayValue, KeyValueList};
    use opentelemetry_proto::tonic::metrics::v1::{Gauge, Histogram, HistogramDataPoint, Sum};
    use opentelemetry_proto::tonic::trace::v1::Status;
    use pretty_assertions::assert_eq;

    const BASE_NANOS: u64 = 1_700_000_000_000_000_000;

    fn kv(key: &str, value: any_value::Value) -> KeyValue {
        KeyValue {
            key: key.to_string(),
            value: Some(AnyValue { value: Some(value) }),
        }
    }

    fn string_kv(key: &str, value: &str) -> KeyValue {
        kv(key, any_value::Value::StringValue(value.to_string()))
    }

    #[test]
    fn test_attribute_shapes() {
        let attrs = attributes_from(&[
            kv("n", any_value::Value::IntValue(7)),
            kv("f", any_value::Value::DoubleValue(1.5)),
            kv("b", any_value::Value::BoolValue(true)),
            kv("raw", any_value::Value::BytesValue(vec![0xab, 0xcd])),
            kv(
                "list",
                any_value::Value::ArrayValue(ArrayValue {
                    values: vec![AnyValue {
                        value: Some(any_value::Value::IntValue(1)),
                    }],
                }),
            ),
            kv(
                "map",
                any_value::Value::KvlistValue(KeyValueList {
                    values: vec![string_kv("k", "v")],
                }),
            ),
            KeyValue {
                key: "empty".to_string(),
                value: None,
            },
        ]);

        assert_eq!(attrs.get("n"), Some(&AttributeValue::Int(7)));
        assert_eq!(attrs.get("f"), Some(&AttributeValue::Double(1.5)));
        assert_eq!(attrs.get("b"), Some(&AttributeValue::Bool(true)));
        assert_eq!(attrs.get("raw"), Some(&AttributeValue::from("abcd")));
        assert_eq!(
            attrs.get("list"),
            Some(&AttributeValue::Array(vec![AttributeValue::Int(1)]))
        );
        assert!(matches!(attrs.get("map"), Some(AttributeValue::Map(m)) if m.len() == 1));
        assert!(!attrs.contains_key("empty"));
    }

    #[test]
    fn test_log_record_conversion() {
        let record = LogRecord {
            time_unix_nano: BASE_NANOS,
            severity_text: "ERROR".to_string(),
            body: Some(AnyValue {
                value: Some(any_value::Value::StringValue("charge failed".to_string())),
            }),
            attributes: vec![
                string_kv("orchestration_id", "order-1"),
                string_kv("activity", "payment:charge"),
                string_kv("error", "card declined"),
            ],
            trace_id: vec![0x11; 16],
            span_id: vec![0x22; 8],
            ..LogRecord::default()
        };

        let event = log_record_to_event(&record);
        assert_eq!(event.trace_id, "11".repeat(16));
        assert_eq!(event.span_id.as_deref(), Some("2222222222222222"));
        assert_eq!(event.orchestration_id.as_deref(), Some("order-1"));
        assert_eq!(event.activity.as_deref(), Some("payment:charge"));
        assert_eq!(event.timestamp.timestamp_millis(), 1_700_000_000_000);
        match event.payload {
            EventPayload::Log(log) => {
                assert_eq!(log.message, "charge failed");
                assert_eq!(log.severity, "ERROR");
                assert_eq!(log.error.as_deref(), Some("card declined"));
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_log_without_ids_or_time() {
        let before = now_utc();
        let event = log_record_to_event(&LogRecord {
            severity_number: SeverityNumber::Warn as i32,
            ..LogRecord::default()
        });
        assert_eq!(event.trace_id, UNKNOWN_TRACE_ID);
        assert!(event.span_id.is_none());
        assert!(event.timestamp >= before);
        match event.payload {
            EventPayload::Log(log) => assert_eq!(log.severity, "SEVERITY_NUMBER_WARN"),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_sum_and_gauge_points() {
        let point = |value| NumberDataPoint {
            time_unix_nano: BASE_NANOS,
            attributes: vec![string_kv("trace_id", "abc")],
            value: Some(value),
            ..NumberDataPoint::default()
        };
        let sum = Metric {
            name: "orders".to_string(),
            unit: "1".to_string(),
            data: Some(metric::Data::Sum(Sum {
                data_points: vec![
                    point(number_data_point::Value::AsInt(3)),
                    point(number_data_point::Value::AsDouble(4.5)),
                ],
                ..Sum::default()
            })),
            ..Metric::default()
        };
        let events = metric_to_events(&sum);
        assert_eq!(events.len(), 2);
        let values: Vec<f64> = events
            .iter()
            .map(|e| match &e.payload {
                EventPayload::Metric(m) => m.metric_value,
                _ => f64::NAN,
            })
            .collect();
        assert_eq!(values, vec![3.0, 4.5]);
        assert!(events.iter().all(|e| e.trace_id == "abc"));

        let gauge = Metric {
            name: "queue_depth".to_string(),
            data: Some(metric::Data::Gauge(Gauge {
                data_points: vec![NumberDataPoint {
                    value: Some(number_data_point::Value::AsInt(9)),
                    ..NumberDataPoint::default()
                }],
                ..Gauge::default()
            })),
            ..Metric::default()
        };
        let events = metric_to_events(&gauge);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].trace_id, UNKNOWN_TRACE_ID);
        assert_eq!(events[0].kind(), EventKind::Metric);
    }

    #[test]
    fn test_histogram_count() {
        let metric = Metric {
            name: "latency".to_string(),
            unit: "ms".to_string(),
            data: Some(metric::Data::Histogram(Histogram {
                data_points: vec![HistogramDataPoint {
                    count: 12,
                    time_unix_nano: BASE_NANOS,
                    ..HistogramDataPoint::default()
                }],
                ..Histogram::default()
            })),
            ..Metric::default()
        };
        let events = metric_to_events(&metric);
        assert_eq!(events.len(), 1);
        match &events[0].payload {
            EventPayload::Metric(m) => {
                assert_eq!(m.metric_name, "latency_count");
                assert!((m.metric_value - 12.0).abs() < f64::EPSILON);
                assert_eq!(m.metric_unit, "ms");
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_non_finite_values_are_dropped() {
        let gauge = Metric {
            name: "ratio".to_string(),
            data: Some(metric::Data::Gauge(Gauge {
                data_points: vec![
                    NumberDataPoint {
                        value: Some(number_data_point::Value::AsDouble(f64::NAN)),
                        ..NumberDataPoint::default()
                    },
                    NumberDataPoint {
                        value: Some(number_data_point::Value::AsDouble(0.5)),
                        attributes: vec![
                            kv("load", any_value::Value::DoubleValue(f64::INFINITY)),
                            kv("cpu", any_value::Value::DoubleValue(0.25)),
                        ],
                        ..NumberDataPoint::default()
                    },
                ],
            })),
            ..Metric::default()
        };
        let events = metric_to_events(&gauge);
        assert_eq!(events.len(), 1);
        let attributes = events[0].payload.attributes();
        assert!(!attributes.contains_key("load"));
        assert_eq!(attributes.get("cpu"), Some(&AttributeValue::Double(0.25)));
        assert!(events[0].payload.is_finite());
    }

    #[test]
    fn test_metric_without_data() {
        assert!(metric_to_events(&Metric::default()).is_empty());
    }

    fn span(status: Option<Status>) -> Span {
        Span {
            trace_id: vec![0xaa; 16],
            span_id: vec![0xbb; 8],
            name: "ChargePayment".to_string(),
            kind: span::SpanKind::Server as i32,
            start_time_unix_nano: BASE_NANOS,
            end_time_unix_nano: BASE_NANOS + 1_450_000_000,
            status,
            ..Span::default()
        }
    }

    #[test]
    fn test_span_latency_and_symbolic_status() {
        let event = span_to_event(&span(Some(Status::default())));
        assert_eq!(event.timestamp.timestamp_millis(), 1_700_000_001_450);
        match event.payload {
            EventPayload::Span(s) => {
                assert_eq!(s.latency_ms, 1450);
                assert_eq!(s.span_status, "STATUS_CODE_UNSET");
                assert_eq!(s.span_kind, "SPAN_KIND_SERVER");
                assert_eq!(s.span_name, "ChargePayment");
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_span_status_variants() {
        let status_of = |event: TelemetryEvent| match event.payload {
            EventPayload::Span(s) => s.span_status,
            _ => String::new(),
        };
        assert_eq!(status_of(span_to_event(&span(None))), DEFAULT_SPAN_STATUS);
        assert_eq!(
            status_of(span_to_event(&span(Some(Status {
                message: "card declined".to_string(),
                code: status::StatusCode::Error as i32,
                ..Status::default()
            })))),
            "card declined"
        );
        assert_eq!(
            status_of(span_to_event(&span(Some(Status {
                message: String::new(),
                code: status::StatusCode::Error as i32,
                ..Status::default()
            })))),
            "STATUS_CODE_ERROR"
        );
    }
}
