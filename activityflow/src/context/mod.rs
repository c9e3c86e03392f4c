//! Context for activity invocations.
//!
//! This module provides:
//! - Correlation identity (trace, span, orchestration ids)
//! - The per-invocation context handed through the pipeline

mod activity;
mod identity;

pub use activity::ActivityContext;
pub use identity::InvocationIdentity;
