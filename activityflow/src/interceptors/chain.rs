//! Interceptor chain for ordered middleware around an activity.

use crate::activities::Activity;
use crate::context::ActivityContext;
use crate::errors::ActivityResult;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Middleware wrapped around an activity invocation.
///
/// Each interceptor receives the remainder of the chain as [`Next`] and
/// decides whether, and how many times, to call it.
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Returns the interceptor's name, used in logs.
    fn name(&self) -> &'static str;

    /// Returns the interceptor's priority (lower = further out).
    fn priority(&self) -> i32 {
        0
    }

    /// Runs this interceptor around `next`.
    async fn intercept(&self, ctx: ActivityContext, input: Vec<u8>, next: Next) -> ActivityResult;
}

/// The rest of an interceptor chain, ending in the activity.
///
/// Cheap to clone and `'static`, so it can be invoked repeatedly or moved
/// into a spawned task.
#[derive(Clone)]
pub struct Next {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    index: usize,
    activity: Arc<dyn Activity>,
}

impl Next {
    /// Invokes the next interceptor, or the activity at the end of the chain.
    pub async fn run(self, ctx: ActivityContext, input: Vec<u8>) -> ActivityResult {
        match self.interceptors.get(self.index).cloned() {
            Some(interceptor) => {
                let next = Self {
                    index: self.index + 1,
                    ..self
                };
                interceptor.intercept(ctx, input, next).await
            }
            None => self.activity.execute(ctx, input).await,
        }
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("index", &self.index)
            .field("remaining", &(self.interceptors.len() - self.index))
            .finish()
    }
}

/// An ordered set of interceptors.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    /// Creates a new empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an interceptor; the chain stays sorted by priority.
    /// Equal priorities keep insertion order.
    pub fn add(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
        self.interceptors.sort_by_key(|i| i.priority());
    }

    /// Builder form of [`InterceptorChain::add`].
    #[must_use]
    pub fn with(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.add(interceptor);
        self
    }

    /// Returns interceptor names, outermost first.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    /// Returns the number of interceptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    /// Returns true if the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Binds the chain to an activity.
    #[must_use]
    pub fn bind(&self, activity: Arc<dyn Activity>) -> Next {
        Next {
            interceptors: self.interceptors.iter().cloned().collect(),
            index: 0,
            activity,
        }
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("interceptors", &self.names())
            .finish()
    }
}
