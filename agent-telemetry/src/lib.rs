//! Observability setup for agents.
//!
//! Installs a `tracing-subscriber` formatter whose verbosity follows `RUST_LOG`,
//! falling back to a configurable directive.

#![warn(missing_docs, clippy::pedantic)]

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// Directive used when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Subscriber options.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    directive: String,
    with_target: bool,
    ansi: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            directive: DEFAULT_DIRECTIVE.to_owned(),
            with_target: false,
            ansi: true,
        }
    }
}

impl TelemetryConfig {
    /// Sets the fallback filter directive, e.g. `info,agent_kernel=debug`.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directive = directive.into();
        self
    }

    /// Includes the event target (module path) in each line.
    #[must_use]
    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    /// Enables or disables ANSI colours.
    #[must_use]
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.ansi = enabled;
        self
    }

    /// Returns the fallback filter directive.
    #[must_use]
    pub fn directive(&self) -> &str {
        &self.directive
    }

    /// Resolves the filter: `RUST_LOG` when set, otherwise the configured directive.
    ///
    /// # Errors
    ///
    /// Returns an error when the configured directive does not parse.
    pub fn filter(&self) -> Result<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.directive)
                .with_context(|| format!("invalid log directive `{}`", self.directive)),
        }
    }
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns an error when the directive is invalid or a global subscriber is
/// already installed.
pub fn init(config: &TelemetryConfig) -> Result<()> {
    let filter = config.filter()?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_ansi(config.ansi)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err))
        .context("failed to install tracing subscriber")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directive_parses() {
        assert!(EnvFilter::try_new(TelemetryConfig::default().directive()).is_ok());
    }

    #[test]
    fn rejects_garbage_directive() {
        let config = TelemetryConfig::default().with_directive("agent_kernel=loudest");
        assert!(EnvFilter::try_new(config.directive()).is_err());
    }

    #[test]
    fn second_init_fails() {
        let config = TelemetryConfig::default().with_ansi(false);
        let _ = init(&config);
        assert!(init(&config).is_err());
    }
}
