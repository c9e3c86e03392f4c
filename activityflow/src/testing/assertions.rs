//! Assertions on activity results.

use crate::errors::{ActivityResult, ErrorKind};

/// Asserts that the result is a success and returns its output.
#[track_caller]
pub fn assert_succeeded(result: &ActivityResult) -> &[u8] {
    match result {
        Ok(output) => output,
        Err(e) => panic!("Expected success, got error: {e}"),
    }
}

/// Asserts that the result failed with the given kind.
#[track_caller]
pub fn assert_failed_with(result: &ActivityResult, expected: ErrorKind) {
    match result {
        Ok(_) => panic!("Expected {expected:?} failure, got success"),
        Err(e) => assert_eq!(
            e.kind(),
            expected,
            "Expected {expected:?} failure, got {:?}: {e}",
            e.kind()
        ),
    }
}

/// Asserts that the result failed with a transient error.
#[track_caller]
pub fn assert_transient(result: &ActivityResult) {
    assert_failed_with(result, ErrorKind::Transient);
}

/// Asserts that the result failed with a permanent error.
#[track_caller]
pub fn assert_permanent(result: &ActivityResult) {
    assert_failed_with(result, ErrorKind::Permanent);
}

/// Asserts that the result failed with the given code.
#[track_caller]
pub fn assert_error_code(result: &ActivityResult, code: &str) {
    match result {
        Ok(_) => panic!("Expected error {code}, got success"),
        Err(e) => assert_eq!(e.code(), code, "Expected error {code}, got: {e}"),
    }
}
