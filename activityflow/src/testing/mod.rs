//! Testing utilities for activity pipelines.
//!
//! This module provides:
//! - Mock activities with scripted results and call counting
//! - Assertions on activity results
//! - Repository and record fixtures

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_error_code, assert_failed_with, assert_permanent, assert_succeeded, assert_transient,
};
pub use fixtures::{log_record, span_event, TestRepositories};
pub use mocks::{CountingActivity, ScriptedActivity, SlowActivity};
