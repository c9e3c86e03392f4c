//! gRPC status classification.

use super::{classify_default, ErrorClassifier};
use crate::errors::ActivityError;
use tonic::Code;

/// Returns true for status codes worth retrying.
///
/// Resource exhaustion, precondition and transaction conflicts, deadline
/// overruns and generic server faults are transient.
#[must_use]
pub const fn is_transient_grpc_code(code: Code) -> bool {
    matches!(
        code,
        Code::Unavailable
            | Code::ResourceExhausted
            | Code::FailedPrecondition
            | Code::Aborted
            | Code::DeadlineExceeded
            | Code::Internal
            | Code::Unknown
    )
}

/// Returns the canonical upper-case name of a status code.
#[must_use]
pub const fn grpc_code_name(code: Code) -> &'static str {
    match code {
        Code::Ok => "OK",
        Code::Cancelled => "CANCELLED",
        Code::Unknown => "UNKNOWN",
        Code::InvalidArgument => "INVALID_ARGUMENT",
        Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
        Code::NotFound => "NOT_FOUND",
        Code::AlreadyExists => "ALREADY_EXISTS",
        Code::PermissionDenied => "PERMISSION_DENIED",
        Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
        Code::FailedPrecondition => "FAILED_PRECONDITION",
        Code::Aborted => "ABORTED",
        Code::OutOfRange => "OUT_OF_RANGE",
        Code::Unimplemented => "UNIMPLEMENTED",
        Code::Internal => "INTERNAL",
        Code::Unavailable => "UNAVAILABLE",
        Code::DataLoss => "DATA_LOSS",
        Code::Unauthenticated => "UNAUTHENTICATED",
    }
}

/// Classifies errors carrying a [`tonic::Status`].
///
/// Unclassified errors whose cause chain contains a status become
/// `GRPC_<CODE>` errors with the status kept as the cause. Other unclassified
/// errors fall back to permanent. Classified errors are returned unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrpcErrorClassifier;

impl GrpcErrorClassifier {
    /// Creates a new classifier.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Classifies a status directly.
    #[must_use]
    pub fn classify_status(status: &tonic::Status) -> ActivityError {
        let code = status.code();
        let error_code = format!("GRPC_{}", grpc_code_name(code));
        let error = if is_transient_grpc_code(code) {
            ActivityError::transient(
                error_code,
                format!("gRPC error (transient): {}", status.message()),
            )
        } else {
            ActivityError::permanent(
                error_code,
                format!("gRPC error (permanent): {}", status.message()),
            )
        };
        error.with_cause(status.clone())
    }
}

impl ErrorClassifier for GrpcErrorClassifier {
    fn classify(&self, error: ActivityError) -> ActivityError {
        if error.is_classified() {
            return error;
        }
        match error.find_cause::<tonic::Status>() {
            Some(status) => Self::classify_status(status),
            None => classify_default(error),
        }
    }
}
