//! Transport error classification.

use thiserror::Error;

/// Result alias used by transports.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors surfaced by platform transports.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Transport is misconfigured (bad URL, unusable credential header).
    #[error("transport not configured: {reason}")]
    Configuration {
        /// Additional context for the failure.
        reason: String,
    },

    /// Registration was rejected or the platform was unreachable.
    #[error("agent registration failed: {reason}")]
    Registration {
        /// HTTP status, when a response was received.
        status: Option<u16>,
        /// Additional context for the failure.
        reason: String,
    },

    /// Fetching pending executions kept failing with transient errors.
    #[error("polling failed after {attempts} attempt(s): {reason}")]
    Poll {
        /// Number of attempts made before giving up.
        attempts: u32,
        /// Last transient failure observed.
        reason: String,
    },

    /// The platform no longer accepts the credential or agent token.
    #[error("platform rejected credentials (HTTP {status})")]
    Unauthorized {
        /// HTTP status (401 or 403).
        status: u16,
    },

    /// Non-retryable contract violation (4xx or malformed response body).
    #[error("platform API error: {reason}")]
    Api {
        /// HTTP status, when the violation came from a response status.
        status: Option<u16>,
        /// Additional context for the failure.
        reason: String,
    },

    /// Submitting an action failed.
    #[error("action submission failed after {attempts} attempt(s): {reason}")]
    Action {
        /// HTTP status of the final response, if any.
        status: Option<u16>,
        /// Number of attempts made.
        attempts: u32,
        /// Additional context for the failure.
        reason: String,
    },
}

impl TransportError {
    /// Convenience constructor for configuration issues.
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for registration failures.
    #[must_use]
    pub fn registration(status: Option<u16>, reason: impl Into<String>) -> Self {
        Self::Registration {
            status,
            reason: reason.into(),
        }
    }

    /// Convenience constructor for contract violations.
    #[must_use]
    pub fn api(status: Option<u16>, reason: impl Into<String>) -> Self {
        Self::Api {
            status,
            reason: reason.into(),
        }
    }

    /// Returns `true` when a later attempt may succeed without intervention.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Poll { .. })
    }

    /// Returns the HTTP status attached to the error, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Registration { status, .. }
            | Self::Api { status, .. }
            | Self::Action { status, .. } => *status,
            Self::Unauthorized { status } => Some(*status),
            Self::Configuration { .. } | Self::Poll { .. } => None,
        }
    }
}
