//! Correlation identity for an activity invocation.

use crate::utils::{generate_span_id, generate_trace_id, generate_uuid_v7};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation ids attached to every record an invocation produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationIdentity {
    /// Unique id of this invocation.
    pub invocation_id: Uuid,

    /// Trace id linking all telemetry of one logical execution.
    pub trace_id: String,

    /// Span id of this invocation.
    pub span_id: String,

    /// The orchestration that scheduled the activity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orchestration_id: Option<String>,
}

impl InvocationIdentity {
    /// Creates an identity with freshly generated ids.
    #[must_use]
    pub fn new() -> Self {
        Self {
            invocation_id: generate_uuid_v7(),
            trace_id: generate_trace_id(),
            span_id: generate_span_id(),
            orchestration_id: None,
        }
    }

    /// Continues an existing trace with a new span.
    #[must_use]
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    /// Sets the span id.
    #[must_use]
    pub fn with_span_id(mut self, span_id: impl Into<String>) -> Self {
        self.span_id = span_id.into();
        self
    }

    /// Sets the orchestration id.
    #[must_use]
    pub fn with_orchestration_id(mut self, orchestration_id: impl Into<String>) -> Self {
        self.orchestration_id = Some(orchestration_id.into());
        self
    }
}

impl Default for InvocationIdentity {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_identity_generates_ids() {
        let id = InvocationIdentity::new();
        assert_eq!(id.trace_id.len(), 32);
        assert_eq!(id.span_id.len(), 16);
        assert!(id.orchestration_id.is_none());
    }

    #[test]
    fn test_serialization_skips_missing_orchestration() {
        let id = InvocationIdentity::new().with_trace_id("abc");
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json["trace_id"], "abc");
        assert!(json.get("orchestration_id").is_none());
    }
}
