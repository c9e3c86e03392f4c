//! Protocol error classification stage.

use super::{Interceptor, Next};
use crate::classification::{ErrorClassifier, GrpcErrorClassifier};
use crate::context::ActivityContext;
use crate::errors::ActivityResult;
use async_trait::async_trait;
use std::sync::Arc;

/// Priority of the classification stage: outside retry.
pub const CLASSIFICATION_PRIORITY: i32 = 0;

/// Installs a classifier into the context so retry sees classified errors,
/// and classifies whatever error leaves the inner chain.
#[derive(Clone)]
pub struct ClassificationInterceptor {
    classifier: Arc<dyn ErrorClassifier>,
}

impl ClassificationInterceptor {
    /// Creates a stage with a custom classifier.
    #[must_use]
    pub fn new(classifier: Arc<dyn ErrorClassifier>) -> Self {
        Self { classifier }
    }

    /// Creates a stage that classifies gRPC status errors.
    #[must_use]
    pub fn grpc() -> Self {
        Self::new(Arc::new(GrpcErrorClassifier::new()))
    }
}

impl Default for ClassificationInterceptor {
    fn default() -> Self {
        Self::grpc()
    }
}

impl std::fmt::Debug for ClassificationInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassificationInterceptor").finish_non_exhaustive()
    }
}

#[async_trait]
impl Interceptor for ClassificationInterceptor {
    fn name(&self) -> &'static str {
        "classification"
    }

    fn priority(&self) -> i32 {
        CLASSIFICATION_PRIORITY
    }

    async fn intercept(&self, ctx: ActivityContext, input: Vec<u8>, next: Next) -> ActivityResult {
        let ctx = ctx.with_classifier(Arc::clone(&self.classifier));
        next.run(ctx, input)
            .await
            .map_err(|e| self.classifier.classify(e))
    }
}
