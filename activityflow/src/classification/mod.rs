//! Error classification.
//!
//! Classifiers turn raw failures into [`ActivityError`]s with a kind the retry
//! stage can act on. Errors that are already classified keep their kind.

mod grpc;

pub use grpc::{grpc_code_name, is_transient_grpc_code, GrpcErrorClassifier};

use crate::errors::{ActivityError, ErrorKind};

/// Assigns an [`ErrorKind`] to activity failures.
#[cfg_attr(test, mockall::automock)]
pub trait ErrorClassifier: Send + Sync {
    /// Returns the classified form of `error`.
    ///
    /// Implementations must return already-classified errors unchanged.
    fn classify(&self, error: ActivityError) -> ActivityError;
}

/// Classifier that only confirms the default: unclassified errors are permanent.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl ErrorClassifier for DefaultClassifier {
    fn classify(&self, error: ActivityError) -> ActivityError {
        classify_default(error)
    }
}

/// Applies the default rule to an error: classified errors pass through,
/// everything else becomes permanent.
#[must_use]
pub fn classify_default(error: ActivityError) -> ActivityError {
    if error.is_classified() {
        error
    } else {
        error.into_classified()
    }
}

/// Returns the kind an error would be assigned by the default rule.
#[must_use]
pub fn classify_kind(error: &ActivityError) -> ErrorKind {
    if error.is_classified() {
        error.kind()
    } else {
        ErrorKind::Permanent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_classifier_keeps_classified_kind() {
        let err = ActivityError::transient("NET", "reset");
        let classified = DefaultClassifier.classify(err);
        assert!(classified.is_transient());
    }

    #[test]
    fn test_default_classifier_marks_raw_as_permanent() {
        let raw = ActivityError::raw(std::io::Error::new(std::io::ErrorKind::Other, "x"));
        assert_eq!(classify_kind(&raw), ErrorKind::Permanent);
        let classified = DefaultClassifier.classify(raw);
        assert!(classified.is_classified());
        assert!(classified.is_permanent());
    }
}
