//! Deadline enforcement around the rest of the chain.
//!
//! The inner chain runs in its own task. When the deadline fires first the
//! interceptor returns `ACTIVITY_TIMEOUT` immediately and cancels the child
//! token it handed to the inner chain. It does not abort or wait for that
//! task, so an activity that ignores its token may keep running after the
//! timeout was reported.

use super::{Interceptor, Next};
use crate::context::ActivityContext;
use crate::errors::{codes, ActivityError, ActivityResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Priority of the timeout stage: inside logging, outside classification.
pub const TIMEOUT_PRIORITY: i32 = -50;

/// Default bound on one activity invocation.
pub const DEFAULT_ACTIVITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Interceptor bounding the whole inner chain, retries included.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutInterceptor {
    timeout: Duration,
}

impl TimeoutInterceptor {
    /// Creates a timeout interceptor.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Returns the configured timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for TimeoutInterceptor {
    fn default() -> Self {
        Self::new(DEFAULT_ACTIVITY_TIMEOUT)
    }
}

#[async_trait]
impl Interceptor for TimeoutInterceptor {
    fn name(&self) -> &'static str {
        "timeout"
    }

    fn priority(&self) -> i32 {
        TIMEOUT_PRIORITY
    }

    async fn intercept(&self, ctx: ActivityContext, input: Vec<u8>, next: Next) -> ActivityResult {
        let deadline = Instant::now() + self.timeout;
        let child = ctx.cancellation().child();
        let inner_ctx = ctx
            .clone()
            .with_cancellation(Arc::clone(&child))
            .with_deadline(deadline);
        let effective = inner_ctx.deadline().unwrap_or(deadline);

        let task = tokio::spawn(next.run(inner_ctx, input));

        tokio::select! {
            biased;
            joined = task => joined.unwrap_or_else(|e| {
                Err(ActivityError::permanent(
                    codes::ACTIVITY_ABORTED,
                    format!("activity {} aborted: {e}", ctx.activity()),
                ))
            }),
            () = ctx.cancellation().cancelled() => Err(ctx.cancelled_error()),
            () = tokio::time::sleep_until(effective) => {
                child.cancel("activity timed out");
                warn!(
                    activity = %ctx.activity(),
                    trace_id = %ctx.trace_id(),
                    timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                    "Activity timed out"
                );
                Err(ActivityError::timeout(
                    codes::ACTIVITY_TIMEOUT,
                    format!("activity {} timed out after {:?}", ctx.activity(), self.timeout),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activities::activity_fn;
    use crate::cancellation::CancellationToken;
    use crate::interceptors::InterceptorChain;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn chain(timeout: Duration) -> InterceptorChain {
        InterceptorChain::new().with(Arc::new(TimeoutInterceptor::new(timeout)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_activity_passes_through() {
        let out = chain(Duration::from_secs(1))
            .bind(activity_fn(|_ctx, input| async move { Ok(input) }))
            .run(ActivityContext::new("fast"), b"in".to_vec())
            .await
            .unwrap();
        assert_eq!(out, b"in");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_activity_times_out() {
        let start = Instant::now();
        let err = chain(Duration::from_millis(500))
            .bind(activity_fn(|_ctx, _input| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Vec::new())
            }))
            .run(ActivityContext::new("slow"), Vec::new())
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(err.is_retryable());
        assert_eq!(err.code(), codes::ACTIVITY_TIMEOUT);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cancels_child_token() {
        let observed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&observed);
        let activity = activity_fn(move |ctx: ActivityContext, _input| {
            let flag = Arc::clone(&flag);
            async move {
                ctx.cancellation().cancelled().await;
                flag.store(true, Ordering::SeqCst);
                Err(ctx.cancelled_error())
            }
        });

        let parent = Arc::new(CancellationToken::new());
        let ctx = ActivityContext::new("cooperative").with_cancellation(Arc::clone(&parent));
        let err = chain(Duration::from_millis(100))
            .bind(activity)
            .run(ctx, Vec::new())
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(observed.load(Ordering::SeqCst));
        assert!(!parent.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_inner_sees_deadline() {
        let out = chain(Duration::from_secs(5))
            .bind(activity_fn(|ctx: ActivityContext, _input| async move {
                let remaining = ctx.remaining().unwrap_or_default();
                Ok(remaining.as_secs().to_string().into_bytes())
            }))
            .run(ActivityContext::new("a"), Vec::new())
            .await
            .unwrap();
        assert_eq!(out, b"5");
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_parent_token_does_not_accumulate_children() {
        let parent = Arc::new(CancellationToken::new());
        let next = chain(Duration::from_secs(1))
            .bind(activity_fn(|_ctx, input| async move { Ok(input) }));
        for _ in 0..50 {
            let ctx = ActivityContext::new("echo").with_cancellation(Arc::clone(&parent));
            next.clone().run(ctx, Vec::new()).await.unwrap();
        }
        assert!(parent.child_slots() <= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_cancellation() {
        let token = Arc::new(CancellationToken::new());
        let ctx = ActivityContext::new("a").with_cancellation(Arc::clone(&token));
        let canceller = Arc::clone(&token);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel("caller gave up");
        });

        let err = chain(Duration::from_secs(60))
            .bind(activity_fn(|_ctx, _input| async {
                tokio::time::sleep(Duration::from_secs(600)).await;
                Ok(Vec::new())
            }))
            .run(ctx, Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::ACTIVITY_CANCELLED);
    }
}
