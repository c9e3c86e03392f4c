//! Retry with capped exponential backoff.

use super::{Interceptor, Next};
use crate::context::ActivityContext;
use crate::errors::{ActivityResult, ConfigError};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Priority of the retry stage: innermost of the standard stages.
pub const RETRY_PRIORITY: i32 = 100;

/// Jitter applied on top of the computed backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// Wait exactly the computed backoff.
    #[default]
    None,
    /// Random from 0 to the backoff.
    Full,
    /// Half fixed, half random.
    Equal,
}

impl JitterStrategy {
    /// Applies jitter to a delay.
    #[must_use]
    pub fn apply(self, delay: Duration) -> Duration {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        match self {
            Self::None => delay,
            Self::Full => Duration::from_millis(rand::thread_rng().gen_range(0..=millis)),
            Self::Equal => {
                let half = millis / 2;
                Duration::from_millis(half + rand::thread_rng().gen_range(0..=millis - half))
            }
        }
    }
}

/// Immutable retry configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
    jitter: JitterStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: JitterStrategy::None,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with `max_attempts` and default backoff settings.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Sets the delay before the second attempt.
    #[must_use]
    pub const fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Sets the upper bound on any single delay.
    #[must_use]
    pub const fn with_max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = backoff;
        self
    }

    /// Sets the growth factor between delays.
    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub const fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Checks `max_attempts >= 1`, `multiplier >= 1` and `initial <= max`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts", "must be at least 1"));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "backoff_multiplier",
                format!("must be a finite value >= 1, got {}", self.multiplier),
            ));
        }
        if self.initial_backoff > self.max_backoff {
            return Err(ConfigError::invalid(
                "initial_backoff",
                "must not exceed max_backoff",
            ));
        }
        Ok(())
    }

    /// Returns the maximum number of invocations.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the initial backoff.
    #[must_use]
    pub const fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    /// Returns the backoff cap.
    #[must_use]
    pub const fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Returns the multiplier.
    #[must_use]
    pub const fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Returns the jitter strategy.
    #[must_use]
    pub const fn jitter(&self) -> JitterStrategy {
        self.jitter
    }

    /// Backoff after the failed attempt `attempt` (0-indexed), without jitter:
    /// `min(initial * multiplier^attempt, max_backoff)`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .map_or(self.max_backoff, |d| d.min(self.max_backoff))
    }

    /// Backoff with jitter applied, still capped at `max_backoff`.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.jitter.apply(self.backoff(attempt)).min(self.max_backoff)
    }
}

/// Runs `operation` under `policy`.
///
/// Each failure is classified through the context's classifier. Permanent
/// failures return at once; retryable ones are retried after the backoff
/// until attempts run out, and the last error is returned unchanged.
/// Cancelling the context during a backoff returns the cancellation error.
pub async fn execute_with_retry<F, Fut>(
    policy: &RetryPolicy,
    ctx: &ActivityContext,
    mut operation: F,
) -> ActivityResult
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = ActivityResult>,
{
    let mut attempt = 0;
    loop {
        let error = match operation(attempt).await {
            Ok(output) => return Ok(output),
            Err(e) => ctx.classify(e),
        };

        if !error.is_retryable() {
            debug!(
                activity = %ctx.activity(),
                attempt = attempt + 1,
                code = %error.code(),
                "Permanent failure, not retrying"
            );
            return Err(error);
        }

        if attempt + 1 >= policy.max_attempts {
            warn!(
                activity = %ctx.activity(),
                attempts = attempt + 1,
                code = %error.code(),
                "Retry attempts exhausted"
            );
            return Err(error);
        }

        let delay = policy.delay(attempt);
        debug!(
            activity = %ctx.activity(),
            attempt = attempt + 1,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %error,
            "Retrying after error"
        );

        tokio::select! {
            biased;
            () = ctx.cancellation().cancelled() => return Err(ctx.cancelled_error()),
            () = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}

/// Interceptor that re-invokes the rest of the chain on retryable failures.
#[derive(Debug, Clone)]
pub struct RetryInterceptor {
    policy: RetryPolicy,
}

impl RetryInterceptor {
    /// Creates a retry interceptor.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Returns the policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl Interceptor for RetryInterceptor {
    fn name(&self) -> &'static str {
        "retry"
    }

    fn priority(&self) -> i32 {
        RETRY_PRIORITY
    }

    async fn intercept(&self, ctx: ActivityContext, input: Vec<u8>, next: Next) -> ActivityResult {
        execute_with_retry(&self.policy, &ctx, |_attempt| {
            next.clone().run(ctx.clone(), input.clone())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::errors::{codes, ActivityError};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3)
            .with_initial_backoff(Duration::from_millis(100))
            .with_max_backoff(Duration::from_millis(150))
    }

    #[test]
    fn test_backoff_is_capped() {
        let p = policy();
        assert_eq!(p.backoff(0), Duration::from_millis(100));
        assert_eq!(p.backoff(1), Duration::from_millis(150));
        assert_eq!(p.backoff(40), Duration::from_millis(150));
    }

    #[test]
    fn test_default_backoff_sequence() {
        let p = RetryPolicy::default();
        assert_eq!(p.backoff(0), Duration::from_millis(100));
        assert_eq!(p.backoff(1), Duration::from_millis(200));
        assert_eq!(p.backoff(2), Duration::from_millis(400));
        assert_eq!(p.backoff(100), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_bounds() {
        let delay = Duration::from_millis(100);
        assert_eq!(JitterStrategy::None.apply(delay), delay);
        for _ in 0..100 {
            assert!(JitterStrategy::Full.apply(delay) <= delay);
            let equal = JitterStrategy::Equal.apply(delay);
            assert!(equal >= Duration::from_millis(50) && equal <= delay);
        }
    }

    #[test]
    fn test_validate() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(RetryPolicy::new(0).validate().is_err());
        assert!(RetryPolicy::default().with_multiplier(0.5).validate().is_err());
        assert!(RetryPolicy::default().with_multiplier(f64::NAN).validate().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_runs_once() {
        let calls = AtomicU32::new(0);
        let result = execute_with_retry(&policy(), &ActivityContext::new("a"), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ActivityError::permanent("BAD_INPUT", "nope")) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err().code(), "BAD_INPUT");
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_runs_max_attempts_with_backoff() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        let result = execute_with_retry(&policy(), &ActivityContext::new("a"), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ActivityError::transient("NET", "reset")) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let err = result.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(err.code(), "NET");
        // 100ms then 150ms (capped)
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(250));
        assert!(elapsed < Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_retry() {
        let calls = AtomicU32::new(0);
        let result = execute_with_retry(&policy(), &ActivityContext::new("a"), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(ActivityError::timeout(codes::ACTIVITY_TIMEOUT, "slow"))
                } else {
                    Ok(b"ok".to_vec())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), b"ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unclassified_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result = execute_with_retry(&policy(), &ActivityContext::new("a"), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ActivityError::raw(std::io::Error::other("disk"))) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(result.unwrap_err().is_permanent());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_backoff() {
        let token = Arc::new(CancellationToken::new());
        let ctx = ActivityContext::new("a").with_cancellation(Arc::clone(&token));
        let slow = RetryPolicy::new(5).with_initial_backoff(Duration::from_secs(10));

        let canceller = Arc::clone(&token);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel("shutdown");
        });

        let start = Instant::now();
        let result = execute_with_retry(&slow, &ctx, |_| async {
            Err(ActivityError::transient("NET", "reset"))
        })
        .await;

        assert_eq!(result.unwrap_err().code(), codes::ACTIVITY_CANCELLED);
        assert!(start.elapsed() < Duration::from_secs(10));
    }
}
