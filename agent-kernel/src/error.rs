//! Error taxonomy surfaced by the agent kernel.

use agent_primitives::{ActionKind, ExecutionId};
use agent_transport::TransportError;
use thiserror::Error;

use crate::lifecycle::LifecycleError;

/// Result alias for kernel operations.
pub type AgentResult<T> = Result<T, AgentError>;

/// Result alias for context actions.
pub type ActionResult<T> = Result<T, ActionError>;

/// Errors produced by the agent kernel.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Registration was rejected or the platform was unreachable. Fatal at startup.
    #[error("agent registration failed: {reason}")]
    Registration {
        /// HTTP status, when a response was received.
        status: Option<u16>,
        /// Human-readable context.
        reason: String,
    },

    /// Fetching executions failed after exhausting retries. Retryable.
    #[error("polling failed after {attempts} attempt(s): {reason}")]
    Poll {
        /// Attempts made in the failed cycle.
        attempts: u32,
        /// Last transient failure.
        reason: String,
    },

    /// Non-retryable contract violation reported by the platform.
    #[error("platform API error: {reason}")]
    Api {
        /// HTTP status, if any.
        status: Option<u16>,
        /// Human-readable context.
        reason: String,
    },

    /// A context action failed.
    #[error(transparent)]
    Action(#[from] ActionError),

    /// Handler registration named an event outside the supported set.
    #[error("cannot register handler: {reason}")]
    InvalidEvent {
        /// The offending event name.
        name: String,
        /// Human-readable context listing supported events.
        reason: String,
    },

    /// An execution carried an event name this client does not recognise.
    #[error("execution {execution_id} has unrecognised event `{name}`; the platform may be newer than this client")]
    UnknownEvent {
        /// Execution that carried the event.
        execution_id: ExecutionId,
        /// The unrecognised event name.
        name: String,
    },

    /// An execution payload could not be projected into a context.
    #[error("execution {execution_id} has a malformed payload: {reason}")]
    MalformedExecution {
        /// Offending execution.
        execution_id: ExecutionId,
        /// Decoding failure.
        reason: String,
    },

    /// The poll loop was driven through an invalid state transition.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Kernel or transport configuration was invalid.
    #[error("invalid agent configuration: {reason}")]
    Configuration {
        /// Human-readable context.
        reason: String,
    },
}

impl AgentError {
    /// Returns `true` when the error must stop the poll loop.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Registration { .. }
                | Self::Api { .. }
                | Self::Lifecycle(_)
                | Self::Configuration { .. }
        )
    }

    /// Returns `true` when a later poll cycle may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Poll { .. })
    }

    pub(crate) fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }
}

impl From<TransportError> for AgentError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Configuration { reason } => Self::Configuration { reason },
            TransportError::Registration { status, reason } => Self::Registration { status, reason },
            TransportError::Poll { attempts, reason } => Self::Poll { attempts, reason },
            TransportError::Unauthorized { status } => Self::Api {
                status: Some(status),
                reason: "platform rejected the agent credentials".into(),
            },
            TransportError::Api { status, reason } => Self::Api { status, reason },
            TransportError::Action {
                status,
                attempts,
                reason,
            } => Self::Api {
                status,
                reason: format!("action submission failed after {attempts} attempt(s): {reason}"),
            },
        }
    }
}

/// Errors returned by context action methods.
#[derive(Debug, Error)]
pub enum ActionError {
    /// Another action already resolved this execution.
    #[error("action already taken for this execution ({execution_id}: {previous} already submitted, {attempted} refused)")]
    AlreadyTaken {
        /// Execution in question.
        execution_id: ExecutionId,
        /// Action that won.
        previous: ActionKind,
        /// Action that was refused.
        attempted: ActionKind,
    },

    /// The platform call failed; the execution stays resolved locally and is not resubmitted.
    #[error("failed to submit {action} for execution {execution_id}: {source}")]
    Submission {
        /// Execution in question.
        execution_id: ExecutionId,
        /// Action that was attempted.
        action: ActionKind,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },
}

impl ActionError {
    /// Returns the execution the error refers to.
    #[must_use]
    pub fn execution_id(&self) -> &ExecutionId {
        match self {
            Self::AlreadyTaken { execution_id, .. } | Self::Submission { execution_id, .. } => {
                execution_id
            }
        }
    }
}
