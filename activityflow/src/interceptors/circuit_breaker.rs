//! Per-operation circuit breakers.
//!
//! A breaker counts requests and failures over a rolling interval while
//! closed. Once at least `min_requests` were seen and the failure ratio
//! reaches the threshold it opens and rejects calls with a transient
//! `CIRCUIT_BREAKER_OPEN` error. After the cool-down one probe is let
//! through: success closes the breaker, failure opens it again.

use super::{Interceptor, Next};
use crate::context::ActivityContext;
use crate::errors::{codes, ActivityError, ActivityResult};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Priority of the breaker stage: inside retry, so rejections can be retried.
pub const CIRCUIT_BREAKER_PRIORITY: i32 = 150;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Calls pass through and are counted.
    Closed,
    /// Calls are rejected.
    Open,
    /// One probe call is allowed.
    HalfOpen,
}

impl BreakerState {
    /// Returns the state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Breaker tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerConfig {
    /// Failure ratio in (0, 1] at which the breaker opens.
    pub failure_threshold: f64,
    /// Requests needed in the interval before the ratio is considered.
    pub min_requests: u32,
    /// Length of the rolling counting interval while closed.
    pub interval: Duration,
    /// How long the breaker stays open before probing.
    pub cool_down: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 0.5,
            min_requests: 3,
            interval: Duration::from_secs(10),
            cool_down: Duration::from_secs(10),
        }
    }
}

impl BreakerConfig {
    /// Creates a config with one duration for both interval and cool-down.
    #[must_use]
    pub fn new(failure_threshold: f64, window: Duration) -> Self {
        Self {
            failure_threshold,
            interval: window,
            cool_down: window,
            ..Self::default()
        }
    }

    fn should_trip(&self, counts: BreakerCounts) -> bool {
        if counts.requests < self.min_requests || counts.requests == 0 {
            return false;
        }
        f64::from(counts.failures) / f64::from(counts.requests) >= self.failure_threshold
    }
}

/// Request and failure counts in the current interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BreakerCounts {
    /// Requests admitted.
    pub requests: u32,
    /// Requests that failed.
    pub failures: u32,
}

struct Inner {
    state: BreakerState,
    counts: BreakerCounts,
    interval_start: Instant,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Admission ticket for one call.
///
/// A permit dropped without [`CircuitBreaker::record`] (the call panicked or
/// its future was dropped) counts as a failure.
#[must_use]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    recorded: bool,
}

impl BreakerPermit<'_> {
    /// Returns true if this permit is the half-open probe.
    pub const fn is_probe(&self) -> bool {
        self.probe
    }

    fn complete(mut self, success: bool) {
        self.recorded = true;
        self.breaker.on_outcome(self.probe, success);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.recorded {
            warn!(breaker = %self.breaker.name, probe = self.probe, "Call abandoned; counted as failure");
            self.breaker.on_outcome(self.probe, false);
        }
    }
}

impl fmt::Debug for BreakerPermit<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerPermit")
            .field("breaker", &self.breaker.name)
            .field("probe", &self.probe)
            .finish()
    }
}

/// A circuit breaker for one named operation.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    #[must_use]
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                counts: BreakerCounts::default(),
                interval_start: Instant::now(),
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Returns the operation name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the config.
    #[must_use]
    pub const fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Returns the current state, moving open to half-open once the cool-down passed.
    #[must_use]
    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner, Instant::now());
        inner.state
    }

    /// Returns the counts of the current interval.
    #[must_use]
    pub fn counts(&self) -> BreakerCounts {
        self.inner.lock().counts
    }

    /// Admits or rejects a call.
    pub fn acquire(&self) -> Result<BreakerPermit<'_>, ActivityError> {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner, Instant::now());
        match inner.state {
            BreakerState::Closed => {
                inner.counts.requests += 1;
                Ok(self.permit(false))
            }
            BreakerState::HalfOpen if !inner.probe_in_flight => {
                inner.probe_in_flight = true;
                inner.counts.requests += 1;
                Ok(self.permit(true))
            }
            BreakerState::HalfOpen | BreakerState::Open => Err(ActivityError::transient(
                codes::CIRCUIT_BREAKER_OPEN,
                format!("circuit breaker open for activity: {}", self.name),
            )),
        }
    }

    /// Records the outcome of an admitted call.
    ///
    /// The outcome is applied to the breaker that issued the permit.
    pub fn record(&self, permit: BreakerPermit<'_>, success: bool) {
        debug_assert!(std::ptr::eq(self, permit.breaker));
        permit.complete(success);
    }

    const fn permit(&self, probe: bool) -> BreakerPermit<'_> {
        BreakerPermit {
            breaker: self,
            probe,
            recorded: false,
        }
    }

    fn on_outcome(&self, probe: bool, success: bool) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        if probe {
            inner.probe_in_flight = false;
            if success {
                self.transition(&mut inner, BreakerState::Closed, now);
            } else {
                self.transition(&mut inner, BreakerState::Open, now);
            }
            return;
        }
        if inner.state != BreakerState::Closed {
            return;
        }
        if !success {
            inner.counts.failures += 1;
            if self.config.should_trip(inner.counts) {
                warn!(
                    breaker = %self.name,
                    requests = inner.counts.requests,
                    failures = inner.counts.failures,
                    "Circuit breaker tripped"
                );
                self.transition(&mut inner, BreakerState::Open, now);
            }
        }
    }

    /// Runs `operation` through the breaker.
    pub async fn call<F, Fut, T>(&self, operation: F) -> ActivityResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ActivityResult<T>>,
    {
        let permit = self.acquire()?;
        let result = operation().await;
        permit.complete(result.is_ok());
        result
    }

    fn refresh(&self, inner: &mut Inner, now: Instant) {
        match inner.state {
            BreakerState::Closed => {
                if now.saturating_duration_since(inner.interval_start) >= self.config.interval {
                    inner.counts = BreakerCounts::default();
                    inner.interval_start = now;
                }
            }
            BreakerState::Open => {
                let cooled = inner
                    .opened_at
                    .is_some_and(|at| now.saturating_duration_since(at) >= self.config.cool_down);
                if cooled {
                    self.transition(inner, BreakerState::HalfOpen, now);
                }
            }
            BreakerState::HalfOpen => {}
        }
    }

    fn transition(&self, inner: &mut Inner, to: BreakerState, now: Instant) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        inner.counts = BreakerCounts::default();
        inner.interval_start = now;
        inner.opened_at = (to == BreakerState::Open).then_some(now);
        info!(breaker = %self.name, %from, %to, "Circuit breaker state changed");
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &inner.state)
            .field("counts", &inner.counts)
            .finish()
    }
}

/// Breakers keyed by operation name, created on first use.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    config: BreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    /// Creates a registry whose breakers share `config`.
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// Returns the breaker for `name`, creating it if needed.
    #[must_use]
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(name) {
            return Arc::clone(breaker.value());
        }
        Arc::clone(
            self.breakers
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.config)))
                .value(),
        )
    }

    /// Returns the breaker for `name` if one exists.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| Arc::clone(b.value()))
    }

    /// Returns every breaker's current state, sorted by name.
    #[must_use]
    pub fn states(&self) -> Vec<(String, BreakerState)> {
        let mut states: Vec<_> = self
            .breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    /// Returns the number of breakers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Returns true if no breaker was created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

/// Interceptor guarding each activity with the breaker named after it.
#[derive(Debug, Clone)]
pub struct CircuitBreakerInterceptor {
    registry: Arc<CircuitBreakerRegistry>,
}

impl CircuitBreakerInterceptor {
    /// Creates the interceptor over a shared registry.
    #[must_use]
    pub const fn new(registry: Arc<CircuitBreakerRegistry>) -> Self {
        Self { registry }
    }

    /// Returns the registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.registry
    }
}

#[async_trait]
impl Interceptor for CircuitBreakerInterceptor {
    fn name(&self) -> &'static str {
        "circuit_breaker"
    }

    fn priority(&self) -> i32 {
        CIRCUIT_BREAKER_PRIORITY
    }

    async fn intercept(&self, ctx: ActivityContext, input: Vec<u8>, next: Next) -> ActivityResult {
        let breaker = self.registry.get_or_create(ctx.activity());
        breaker.call(|| next.run(ctx, input)).await
    }
}
