//! Named activities, each wrapped in the standard pipeline.

use super::Activity;
use crate::context::ActivityContext;
use crate::errors::{codes, ActivityError, ActivityResult, ConfigError};
use crate::interceptors::{CircuitBreakerRegistry, RetryPolicy};
use crate::observability::ActivityLogger;
use crate::pipeline::{ActivityPipeline, PipelineBuilder};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Dependencies shared by every registered activity.
#[derive(Debug, Clone)]
pub struct ActivityDeps {
    /// Logger for the logging stage.
    pub logger: ActivityLogger,
    /// Retry policy for the retry stage.
    pub retry_policy: RetryPolicy,
    /// Bound on one invocation, retries included.
    pub timeout: Duration,
    /// Optional breakers, keyed by activity name.
    pub circuit_breakers: Option<Arc<CircuitBreakerRegistry>>,
}

impl Default for ActivityDeps {
    fn default() -> Self {
        Self {
            logger: ActivityLogger::default(),
            retry_policy: RetryPolicy::default(),
            timeout: crate::interceptors::DEFAULT_ACTIVITY_TIMEOUT,
            circuit_breakers: None,
        }
    }
}

impl ActivityDeps {
    fn builder(&self) -> PipelineBuilder {
        let builder = PipelineBuilder::new()
            .logger(self.logger.clone())
            .timeout(self.timeout)
            .retry(self.retry_policy);
        match &self.circuit_breakers {
            Some(registry) => builder.circuit_breakers(Arc::clone(registry)),
            None => builder,
        }
    }
}

/// Registry of activities by name.
#[derive(Debug)]
pub struct ActivityRegistry {
    deps: ActivityDeps,
    activities: HashMap<String, ActivityPipeline>,
}

impl ActivityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(deps: ActivityDeps) -> Self {
        Self {
            deps,
            activities: HashMap::new(),
        }
    }

    /// Registers `activity` under `name`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the shared dependencies are invalid.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        activity: Arc<dyn Activity>,
    ) -> Result<(), ConfigError> {
        let name = name.into();
        let pipeline = self.deps.builder().build(name.clone(), activity)?;
        debug!(activity = %name, stages = ?pipeline.stages(), "Registered activity");
        self.activities.insert(name, pipeline);
        Ok(())
    }

    /// Returns the pipeline for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ActivityPipeline> {
        self.activities.get(name)
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.activities.contains_key(name)
    }

    /// Returns the registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.activities.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of registered activities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.activities.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    /// Returns the shared dependencies.
    #[must_use]
    pub const fn deps(&self) -> &ActivityDeps {
        &self.deps
    }

    /// Invokes the named activity. The context is renamed to `name`.
    ///
    /// Unknown names fail with a permanent `ACTIVITY_NOT_FOUND` error.
    pub async fn invoke(&self, name: &str, ctx: ActivityContext, input: Vec<u8>) -> ActivityResult {
        let Some(pipeline) = self.activities.get(name) else {
            return Err(ActivityError::permanent(
                codes::ACTIVITY_NOT_FOUND,
                format!("no activity registered under {name}"),
            ));
        };
        pipeline.invoke(ctx.for_activity(name), input).await
    }
}
