//! Activity abstraction and registry.
//!
//! An activity is an opaque `(context, bytes) -> bytes` function. The
//! pipeline never looks inside payloads; it only fingerprints them.

mod registry;

pub use registry::{ActivityDeps, ActivityRegistry};

use crate::context::ActivityContext;
use crate::errors::ActivityResult;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A unit of work invoked by the pipeline.
///
/// Implementations may be called more than once for one logical invocation
/// (retries), so side effects must be safe to repeat.
#[async_trait]
pub trait Activity: Send + Sync {
    /// Runs the activity.
    async fn execute(&self, ctx: ActivityContext, input: Vec<u8>) -> ActivityResult;
}

/// Adapts an async closure into an [`Activity`].
pub struct FnActivity<F> {
    func: F,
}

impl<F> FnActivity<F> {
    /// Wraps `func`.
    pub const fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> fmt::Debug for FnActivity<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnActivity").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> Activity for FnActivity<F>
where
    F: Fn(ActivityContext, Vec<u8>) -> Fut + Send + Sync,
    Fut: Future<Output = ActivityResult> + Send,
{
    async fn execute(&self, ctx: ActivityContext, input: Vec<u8>) -> ActivityResult {
        (self.func)(ctx, input).await
    }
}

/// Boxes an async closure as a shared [`Activity`].
pub fn activity_fn<F, Fut>(func: F) -> Arc<dyn Activity>
where
    F: Fn(ActivityContext, Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ActivityResult> + Send + 'static,
{
    Arc::new(FnActivity::new(func))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ActivityError;

    #[tokio::test]
    async fn test_fn_activity_echoes_input() {
        let echo = activity_fn(|_ctx, input| async move { Ok(input) });
        let out = echo
            .execute(ActivityContext::new("echo"), b"ping".to_vec())
            .await
            .unwrap();
        assert_eq!(out, b"ping");
    }

    #[tokio::test]
    async fn test_fn_activity_sees_context() {
        let named = activity_fn(|ctx: ActivityContext, _input| async move {
            if ctx.activity() == "payment:charge" {
                Ok(Vec::new())
            } else {
                Err(ActivityError::permanent("WRONG", ctx.activity().to_string()))
            }
        });
        assert!(named
            .execute(ActivityContext::new("payment:charge"), Vec::new())
            .await
            .is_ok());
    }
}
