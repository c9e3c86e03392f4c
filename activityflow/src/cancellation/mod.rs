//! Cooperative cancellation for activity invocations.

mod token;

pub use token::{CancelCallback, CancellationToken};
