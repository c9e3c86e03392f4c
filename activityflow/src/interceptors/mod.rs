//! Interceptors (middleware) around activity execution.
//!
//! Stages are ordered by priority, lowest outermost. The standard order is
//! logging, timeout, classification, retry, then the optional circuit breaker.

mod chain;
mod circuit_breaker;
mod classification;
mod logging;
mod retry;
mod timeout;

pub use chain::{Interceptor, InterceptorChain, Next};
pub use circuit_breaker::{
    BreakerConfig, BreakerCounts, BreakerPermit, BreakerState, CircuitBreaker,
    CircuitBreakerInterceptor, CircuitBreakerRegistry, CIRCUIT_BREAKER_PRIORITY,
};
pub use classification::{ClassificationInterceptor, CLASSIFICATION_PRIORITY};
pub use logging::{LoggingInterceptor, LOGGING_PRIORITY};
pub use retry::{execute_with_retry, JitterStrategy, RetryInterceptor, RetryPolicy, RETRY_PRIORITY};
pub use timeout::{TimeoutInterceptor, DEFAULT_ACTIVITY_TIMEOUT, TIMEOUT_PRIORITY};
