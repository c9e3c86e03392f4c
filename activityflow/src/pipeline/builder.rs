//! Pipeline builder with validation.

use super::ActivityPipeline;
use crate::activities::Activity;
use crate::errors::ConfigError;
use crate::interceptors::{
    CircuitBreakerInterceptor, CircuitBreakerRegistry, ClassificationInterceptor, Interceptor,
    InterceptorChain, LoggingInterceptor, RetryInterceptor, RetryPolicy, TimeoutInterceptor,
    DEFAULT_ACTIVITY_TIMEOUT,
};
use crate::observability::ActivityLogger;
use std::sync::Arc;
use std::time::Duration;

/// Builder for the standard activity chain.
///
/// Produces logging, timeout, classification and retry stages, plus a
/// circuit breaker when a registry is supplied. Extra interceptors are
/// placed by their own priority.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    logger: ActivityLogger,
    timeout: Duration,
    retry: RetryPolicy,
    classification: ClassificationInterceptor,
    breakers: Option<Arc<CircuitBreakerRegistry>>,
    extra: InterceptorChain,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    /// Creates a builder with default settings and a logger without a sink.
    #[must_use]
    pub fn new() -> Self {
        Self {
            logger: ActivityLogger::default(),
            timeout: DEFAULT_ACTIVITY_TIMEOUT,
            retry: RetryPolicy::default(),
            classification: ClassificationInterceptor::grpc(),
            breakers: None,
            extra: InterceptorChain::new(),
        }
    }

    /// Sets the logger used by the logging stage.
    #[must_use]
    pub fn logger(mut self, logger: ActivityLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Sets the bound on one whole invocation, retries included.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Replaces the classification stage.
    #[must_use]
    pub fn classification(mut self, stage: ClassificationInterceptor) -> Self {
        self.classification = stage;
        self
    }

    /// Guards each activity with a breaker from `registry`.
    #[must_use]
    pub fn circuit_breakers(mut self, registry: Arc<CircuitBreakerRegistry>) -> Self {
        self.breakers = Some(registry);
        self
    }

    /// Adds a custom interceptor.
    #[must_use]
    pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.extra.add(interceptor);
        self
    }

    /// Assembles the interceptor chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the retry policy or timeout is invalid.
    pub fn chain(&self) -> Result<InterceptorChain, ConfigError> {
        self.retry.validate()?;
        if self.timeout.is_zero() {
            return Err(ConfigError::invalid("timeout", "must be greater than zero"));
        }

        let mut chain = self
            .extra
            .clone()
            .with(Arc::new(LoggingInterceptor::new(self.logger.clone())))
            .with(Arc::new(TimeoutInterceptor::new(self.timeout)))
            .with(Arc::new(self.classification.clone()))
            .with(Arc::new(RetryInterceptor::new(self.retry)));
        if let Some(registry) = &self.breakers {
            chain.add(Arc::new(CircuitBreakerInterceptor::new(Arc::clone(registry))));
        }
        Ok(chain)
    }

    /// Wraps `activity` in the assembled chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(
        &self,
        name: impl Into<String>,
        activity: Arc<dyn Activity>,
    ) -> Result<ActivityPipeline, ConfigError> {
        Ok(ActivityPipeline::new(name, &self.chain()?, activity))
    }
}
