//! Mock activities for testing pipelines.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::activities::Activity;
use crate::context::ActivityContext;
use crate::errors::{ActivityError, ActivityResult};

/// An activity that returns scripted results in order.
///
/// Once the script is exhausted it echoes its input. Every call is counted
/// and the context's activity name recorded.
#[derive(Debug, Default)]
pub struct ScriptedActivity {
    script: Mutex<VecDeque<ActivityResult>>,
    calls: AtomicU32,
    contexts: Mutex<Vec<String>>,
}

impl ScriptedActivity {
    /// Creates an activity that echoes its input.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an activity returning `results` in order.
    #[must_use]
    pub fn from_results(results: impl IntoIterator<Item = ActivityResult>) -> Self {
        Self {
            script: Mutex::new(results.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Creates an activity that fails `failures` times with `error`, then succeeds.
    #[must_use]
    pub fn failing_then_ok(failures: usize, error: &ActivityError, output: &[u8]) -> Self {
        let mut results: Vec<ActivityResult> = (0..failures).map(|_| Err(error.clone())).collect();
        results.push(Ok(output.to_vec()));
        Self::from_results(results)
    }

    /// Appends a result to the script.
    pub fn push(&self, result: ActivityResult) {
        self.script.lock().push_back(result);
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns the activity names seen on each call.
    #[must_use]
    pub fn recorded_activities(&self) -> Vec<String> {
        self.contexts.lock().clone()
    }

    /// Returns this mock as a shareable activity.
    #[must_use]
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl Activity for ScriptedActivity {
    async fn execute(&self, ctx: ActivityContext, input: Vec<u8>) -> ActivityResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().push(ctx.activity().to_string());
        let next = self.script.lock().pop_front();
        next.unwrap_or(Ok(input))
    }
}

/// Wraps another activity and counts invocations.
pub struct CountingActivity {
    inner: Arc<dyn Activity>,
    calls: AtomicU32,
}

impl CountingActivity {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn Activity>) -> Self {
        Self {
            inner,
            calls: AtomicU32::new(0),
        }
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for CountingActivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountingActivity")
            .field("calls", &self.call_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Activity for CountingActivity {
    async fn execute(&self, ctx: ActivityContext, input: Vec<u8>) -> ActivityResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(ctx, input).await
    }
}

/// An activity that sleeps, then echoes its input.
///
/// Returns the context's cancellation error if cancelled while sleeping.
#[derive(Debug)]
pub struct SlowActivity {
    delay: Duration,
}

impl SlowActivity {
    /// Creates a slow activity.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Activity for SlowActivity {
    async fn execute(&self, ctx: ActivityContext, input: Vec<u8>) -> ActivityResult {
        tokio::select! {
            () = tokio::time::sleep(self.delay) => Ok(input),
            () = ctx.cancellation().cancelled() => Err(ctx.cancelled_error()),
        }
    }
}
