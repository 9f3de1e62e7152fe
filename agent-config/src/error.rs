//! Configuration errors.

use thiserror::Error;

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while assembling agent configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No API key was supplied in code or in `AVALA_API_KEY`.
    #[error("API key required: pass it explicitly or set {}", crate::ENV_API_KEY)]
    MissingApiKey,

    /// A value could not be parsed or is out of range.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Setting or environment variable name.
        key: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// The identity built from the configuration failed validation.
    #[error(transparent)]
    Identity(#[from] agent_primitives::Error),

    /// The agent could not be constructed from otherwise valid settings.
    #[error(transparent)]
    Agent(#[from] agent_kernel::AgentError),
}

impl ConfigError {
    pub(crate) fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
