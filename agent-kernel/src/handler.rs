//! Event handler contract.

use std::future::Future;

use async_trait::async_trait;
use thiserror::Error;

use crate::context::ExecutionContext;
use crate::error::ActionError;

/// Errors a handler may return. Returned errors are logged and do not stop dispatch.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// A context action failed.
    #[error(transparent)]
    Action(#[from] ActionError),
    /// Custom handler error with human-readable context.
    #[error("handler error: {0}")]
    Custom(String),
}

impl HandlerError {
    /// Creates a custom error variant from a string-like value.
    #[must_use]
    pub fn custom(reason: impl Into<String>) -> Self {
        Self::Custom(reason.into())
    }
}

/// Result alias for handler operations.
pub type HandlerResult<T = ()> = Result<T, HandlerError>;

/// Trait implemented by user code reacting to platform events.
///
/// Async closures taking an [`ExecutionContext`] implement it automatically.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles one execution. Implementations resolve it through the context's action methods.
    async fn handle(&self, ctx: ExecutionContext) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> EventHandler for F
where
    F: Send + Sync + Fn(ExecutionContext) -> Fut,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn handle(&self, ctx: ExecutionContext) -> HandlerResult {
        (self)(ctx).await
    }
}
