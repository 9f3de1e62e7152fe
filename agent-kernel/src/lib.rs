//! Agent kernel for Avala workflow agents.
//!
//! This crate wires the pieces an agent needs at runtime: the handler registry,
//! per-execution contexts with at-most-once action submission, and the polling
//! loop with its lifecycle state machine.

#![warn(missing_docs, clippy::pedantic)]

mod agent;
mod context;
mod dispatcher;
mod error;
mod handler;
mod lifecycle;
mod registry;

pub use agent::{DEFAULT_POLL_INTERVAL, PollConfig, StopHandle, TaskAgent};
pub use context::{
    ContextFactory, ContextView, ExecutionContext, Resolution, ResultContext, TaskContext,
};
pub use dispatcher::ActionDispatcher;
pub use error::{ActionError, ActionResult, AgentError, AgentResult};
pub use handler::{EventHandler, HandlerError, HandlerResult};
pub use lifecycle::{AgentState, Lifecycle, LifecycleError, LifecycleEvent, LifecycleResult};
pub use registry::HandlerRegistry;
