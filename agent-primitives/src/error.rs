//! Shared error definitions for agent primitives.

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the agent runtime.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while manipulating agent primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The event name is not one of the supported agent events.
    #[error("unknown event `{name}`; supported events: {supported}")]
    InvalidEvent {
        /// The offending event name.
        name: String,
        /// Comma separated list of supported event names.
        supported: String,
    },

    /// The action name is not one of approve, reject, flag, or skip.
    #[error("unknown action `{name}`")]
    InvalidAction {
        /// The offending action name.
        name: String,
    },

    /// Identity definition failed validation.
    #[error("invalid agent identity: {reason}")]
    InvalidIdentity {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// An identifier was empty or otherwise malformed.
    #[error("invalid {kind} identifier: {reason}")]
    InvalidId {
        /// Which identifier kind was rejected.
        kind: &'static str,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// A submission identifier could not be parsed.
    #[error("invalid submission id: {source}")]
    InvalidSubmissionId {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },
}

impl Error {
    pub(crate) fn identity(reason: impl Into<String>) -> Self {
        Self::InvalidIdentity {
            reason: reason.into(),
        }
    }
}
