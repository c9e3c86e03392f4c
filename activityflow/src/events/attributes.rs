//! Attribute values carried by telemetry events.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute map, ordered so serialized payloads are stable.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Attribute key carrying the orchestration id.
pub const ORCHESTRATION_ID_KEY: &str = "orchestration_id";
/// Attribute key carrying the activity name.
pub const ACTIVITY_KEY: &str = "activity";
/// Attribute key carrying a trace id on metric data points.
pub const TRACE_ID_KEY: &str = "trace_id";

/// A closed set of attribute value shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point.
    Double(f64),
    /// UTF-8 string. Binary values are stored hex-encoded.
    String(String),
    /// Homogeneous or mixed list.
    Array(Vec<AttributeValue>),
    /// Nested key/value list.
    Map(BTreeMap<String, AttributeValue>),
}

impl AttributeValue {
    /// Returns the string value, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns false if this value, or any nested value, is a NaN or
    /// infinite double. Such values do not survive JSON storage.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Double(d) => d.is_finite(),
            Self::Array(values) => values.iter().all(Self::is_finite),
            Self::Map(map) => all_finite(map),
            Self::Bool(_) | Self::Int(_) | Self::String(_) => true,
        }
    }

    /// Returns the value as a float when it is numeric.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Double(d) => Some(*d),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Returns true if every attribute value is finite.
#[must_use]
pub fn all_finite(attributes: &Attributes) -> bool {
    attributes.values().all(AttributeValue::is_finite)
}

/// Returns the string attribute under `key`, if present.
#[must_use]
pub fn string_attribute<'a>(attributes: &'a Attributes, key: &str) -> Option<&'a str> {
    attributes.get(key).and_then(AttributeValue::as_str)
}
