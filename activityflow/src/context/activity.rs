//! Per-invocation activity context.

use super::InvocationIdentity;
use crate::cancellation::CancellationToken;
use crate::classification::{classify_default, ErrorClassifier};
use crate::errors::ActivityError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Context handed to every stage and to the activity function itself.
///
/// Cloning is cheap; clones share the cancellation token.
#[derive(Clone)]
pub struct ActivityContext {
    identity: InvocationIdentity,
    activity: String,
    cancellation: Arc<CancellationToken>,
    deadline: Option<Instant>,
    classifier: Option<Arc<dyn ErrorClassifier>>,
}

impl ActivityContext {
    /// Creates a context for the named activity with a fresh identity.
    #[must_use]
    pub fn new(activity: impl Into<String>) -> Self {
        Self::with_identity(activity, InvocationIdentity::new())
    }

    /// Creates a context with a caller-provided identity.
    #[must_use]
    pub fn with_identity(activity: impl Into<String>, identity: InvocationIdentity) -> Self {
        Self {
            identity,
            activity: activity.into(),
            cancellation: Arc::new(CancellationToken::new()),
            deadline: None,
            classifier: None,
        }
    }

    /// Sets the orchestration id.
    #[must_use]
    pub fn with_orchestration_id(mut self, orchestration_id: impl Into<String>) -> Self {
        self.identity.orchestration_id = Some(orchestration_id.into());
        self
    }

    /// Sets the trace id.
    #[must_use]
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.identity.trace_id = trace_id.into();
        self
    }

    /// Replaces the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancellation = token;
        self
    }

    /// Sets an absolute deadline. An earlier existing deadline is kept.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(self.deadline.map_or(deadline, |d| d.min(deadline)));
        self
    }

    /// Installs the classifier used by [`ActivityContext::classify`].
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Renames the activity, keeping the identity.
    #[must_use]
    pub fn for_activity(mut self, activity: impl Into<String>) -> Self {
        self.activity = activity.into();
        self
    }

    /// Returns the activity name.
    #[must_use]
    pub fn activity(&self) -> &str {
        &self.activity
    }

    /// Returns the correlation identity.
    #[must_use]
    pub const fn identity(&self) -> &InvocationIdentity {
        &self.identity
    }

    /// Returns the trace id.
    #[must_use]
    pub fn trace_id(&self) -> &str {
        &self.identity.trace_id
    }

    /// Returns the span id.
    #[must_use]
    pub fn span_id(&self) -> &str {
        &self.identity.span_id
    }

    /// Returns the orchestration id, if any.
    #[must_use]
    pub fn orchestration_id(&self) -> Option<&str> {
        self.identity.orchestration_id.as_deref()
    }

    /// Returns the cancellation token.
    #[must_use]
    pub const fn cancellation(&self) -> &Arc<CancellationToken> {
        &self.cancellation
    }

    /// Returns true if the invocation was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Returns the deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the time left until the deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Returns the error produced when this invocation is cancelled.
    #[must_use]
    pub fn cancelled_error(&self) -> ActivityError {
        ActivityError::cancelled(self.cancellation.reason())
    }

    /// Classifies an error with the installed classifier, or the default rule.
    #[must_use]
    pub fn classify(&self, error: ActivityError) -> ActivityError {
        match &self.classifier {
            Some(classifier) => classifier.classify(error),
            None => classify_default(error),
        }
    }
}

impl fmt::Debug for ActivityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityContext")
            .field("activity", &self.activity)
            .field("identity", &self.identity)
            .field("cancelled", &self.is_cancelled())
            .field("deadline", &self.deadline)
            .field("has_classifier", &self.classifier.is_some())
            .finish()
    }
}
