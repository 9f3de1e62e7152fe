//! Event to handler registry.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use agent_primitives::AgentEvent;
use futures::FutureExt;
use tracing::{debug, warn};

use crate::context::ExecutionContext;
use crate::error::{AgentError, AgentResult};
use crate::handler::{EventHandler, HandlerResult};

/// Ordered handler lists keyed by event.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<AgentEvent, Vec<Arc<dyn EventHandler>>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: BTreeMap<_, _> = self
            .handlers
            .iter()
            .map(|(event, handlers)| (event.as_str(), handlers.len()))
            .collect();
        f.debug_struct("HandlerRegistry")
            .field("handlers", &counts)
            .finish()
    }
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an async closure for the event named `event`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidEvent`] when `event` is not a supported event
    /// name. Nothing is stored in that case.
    pub fn register<F, Fut>(&mut self, event: &str, handler: F) -> AgentResult<AgentEvent>
    where
        F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let parsed = event
            .parse::<AgentEvent>()
            .map_err(|err| AgentError::InvalidEvent {
                name: event.to_owned(),
                reason: err.to_string(),
            })?;
        self.subscribe(parsed, Arc::new(handler));
        Ok(parsed)
    }

    /// Appends a handler for a typed event.
    pub fn subscribe(&mut self, event: AgentEvent, handler: Arc<dyn EventHandler>) {
        let handlers = self.handlers.entry(event).or_default();
        handlers.push(handler);
        debug!(%event, position = handlers.len(), "handler registered");
    }

    /// Number of handlers registered for `event`.
    #[must_use]
    pub fn handler_count(&self, event: AgentEvent) -> usize {
        self.handlers.get(&event).map_or(0, Vec::len)
    }

    /// Events with at least one handler, in stable order.
    #[must_use]
    pub fn events(&self) -> Vec<AgentEvent> {
        self.handlers.keys().copied().collect()
    }

    /// Returns `true` when no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs every handler registered for the context's event, in registration
    /// order, and returns how many completed without error.
    ///
    /// Errors and panics are logged and do not prevent later handlers from running.
    pub async fn dispatch(&self, ctx: &ExecutionContext) -> usize {
        let event = ctx.event();
        let Some(handlers) = self.handlers.get(&event) else {
            return 0;
        };

        let mut succeeded = 0;
        for (position, handler) in handlers.iter().enumerate() {
            let outcome = AssertUnwindSafe(handler.handle(ctx.clone()))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => succeeded += 1,
                Ok(Err(err)) => warn!(
                    execution_id = %ctx.execution_id(),
                    %event,
                    position,
                    error = %err,
                    "handler failed"
                ),
                Err(panic) => warn!(
                    execution_id = %ctx.execution_id(),
                    %event,
                    position,
                    panic = %panic_message(panic.as_ref()),
                    "handler panicked"
                ),
            }
        }
        succeeded
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
