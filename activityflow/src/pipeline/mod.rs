//! Activity pipelines: an activity bound to its interceptor chain.

mod builder;

pub use builder::PipelineBuilder;

use crate::activities::Activity;
use crate::context::ActivityContext;
use crate::errors::ActivityResult;
use crate::interceptors::{InterceptorChain, Next};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// An activity wrapped in its interceptors.
///
/// A pipeline is itself an [`Activity`], so pipelines can be nested.
#[derive(Clone)]
pub struct ActivityPipeline {
    name: String,
    stages: Vec<&'static str>,
    entry: Next,
}

impl ActivityPipeline {
    /// Binds `activity` to `chain`.
    #[must_use]
    pub fn new(name: impl Into<String>, chain: &InterceptorChain, activity: Arc<dyn Activity>) -> Self {
        Self {
            name: name.into(),
            stages: chain.names(),
            entry: chain.bind(activity),
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns stage names, outermost first.
    #[must_use]
    pub fn stages(&self) -> &[&'static str] {
        &self.stages
    }

    /// Runs one invocation through every stage.
    pub async fn invoke(&self, ctx: ActivityContext, input: Vec<u8>) -> ActivityResult {
        self.entry.clone().run(ctx, input).await
    }
}

#[async_trait]
impl Activity for ActivityPipeline {
    async fn execute(&self, ctx: ActivityContext, input: Vec<u8>) -> ActivityResult {
        self.invoke(ctx, input).await
    }
}

impl fmt::Debug for ActivityPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityPipeline")
            .field("name", &self.name)
            .field("stages", &self.stages)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activities::activity_fn;
    use crate::errors::{codes, ActivityError};
    use crate::interceptors::RetryPolicy;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn counting(
        calls: &Arc<AtomicU32>,
        error: ActivityError,
    ) -> Arc<dyn Activity> {
        let calls = Arc::clone(calls);
        activity_fn(move |_ctx, _input| {
            calls.fetch_add(1, Ordering::SeqCst);
            let error = error.clone();
            async move { Err(error) }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_invokes_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let pipeline = PipelineBuilder::new()
            .build("payment:charge", counting(&calls, ActivityError::permanent("DECLINED", "no")))
            .unwrap();

        let err = pipeline
            .invoke(ActivityContext::new("payment:charge"), Vec::new())
            .await
            .unwrap_err();
        assert!(err.is_permanent());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_invokes_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let pipeline = PipelineBuilder::new()
            .retry(RetryPolicy::new(4).with_initial_backoff(Duration::from_millis(10)))
            .build("inventory:reserve", counting(&calls, ActivityError::transient("BUSY", "retry")))
            .unwrap();

        let err = pipeline
            .invoke(ActivityContext::new("inventory:reserve"), Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "BUSY");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_bounds_all_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let pipeline = PipelineBuilder::new()
            .timeout(Duration::from_millis(250))
            .retry(
                RetryPolicy::new(10)
                    .with_initial_backoff(Duration::from_millis(100))
                    .with_multiplier(1.0),
            )
            .build("a", counting(&calls, ActivityError::transient("BUSY", "retry")))
            .unwrap();

        let err = pipeline
            .invoke(ActivityContext::new("a"), Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::ACTIVITY_TIMEOUT);
        assert!(calls.load(Ordering::SeqCst) < 10);
    }

    #[tokio::test]
    async fn test_pipeline_is_an_activity() {
        let inner = PipelineBuilder::new()
            .build("echo", activity_fn(|_ctx, input| async move { Ok(input) }))
            .unwrap();
        let outer: Arc<dyn Activity> = Arc::new(inner);
        let out = outer
            .execute(ActivityContext::new("echo"), b"hi".to_vec())
            .await
            .unwrap();
        assert_eq!(out, b"hi");
    }
}
