//! Core shared types for agents running against the Avala annotation platform.

#![warn(missing_docs, clippy::pedantic)]

mod action;
mod error;
mod event;
mod execution;
mod identity;
mod ids;

/// Workflow decisions relayed back to the platform.
pub use action::{ActionKind, ActionSubmission};
/// Error type and result alias shared across the SDK.
pub use error::{Error, Result};
/// Closed set of lifecycle events an agent can subscribe to.
pub use event::{AgentEvent, EventFamily};
/// Raw pending executions returned by the platform.
pub use execution::ExecutionRecord;
/// Agent identity and credentials.
pub use identity::{AgentIdentity, AgentIdentityBuilder, ApiKey, DEFAULT_AGENT_NAME, DEFAULT_BASE_URL};
/// Identifier newtypes.
pub use ids::{AgentToken, ExecutionId, SubmissionId};
