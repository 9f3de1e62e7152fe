//! Configuration management for Avala workflow agents.
//!
//! [`AgentConfig`] collects every knob an agent needs, either in code or from
//! `AVALA_*` environment variables, and turns it into the typed settings the
//! transport and kernel consume.

#![warn(missing_docs, clippy::pedantic)]

mod error;

use std::num::{NonZeroU32, NonZeroUsize};
use std::time::Duration;

use agent_kernel::{PollConfig, TaskAgent};
use agent_primitives::{AgentIdentity, ApiKey, DEFAULT_AGENT_NAME, DEFAULT_BASE_URL};
use agent_transport::{RetryPolicy, TransportConfig};
use serde::Deserialize;
use tracing::debug;

pub use error::{ConfigError, ConfigResult};

/// API key variable.
pub const ENV_API_KEY: &str = "AVALA_API_KEY";
/// API root variable.
pub const ENV_BASE_URL: &str = "AVALA_BASE_URL";
/// Agent name variable.
pub const ENV_AGENT_NAME: &str = "AVALA_AGENT_NAME";
/// Project filter variable.
pub const ENV_PROJECT: &str = "AVALA_PROJECT";
/// Comma separated task type filter variable.
pub const ENV_TASK_TYPES: &str = "AVALA_TASK_TYPES";
/// Poll interval variable, in seconds.
pub const ENV_POLL_INTERVAL: &str = "AVALA_POLL_INTERVAL";
/// Per-request timeout variable, in seconds.
pub const ENV_REQUEST_TIMEOUT: &str = "AVALA_REQUEST_TIMEOUT";
/// Attempt ceiling variable for retried calls.
pub const ENV_MAX_ATTEMPTS: &str = "AVALA_MAX_ATTEMPTS";
/// In-flight execution limit variable.
pub const ENV_MAX_CONCURRENCY: &str = "AVALA_MAX_CONCURRENCY";

/// Complete agent configuration.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    api_key: Option<String>,
    base_url: String,
    name: String,
    project: Option<String>,
    task_types: Vec<String>,
    #[serde(with = "seconds")]
    poll_interval: Duration,
    #[serde(with = "seconds")]
    request_timeout: Duration,
    max_attempts: u32,
    max_concurrency: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_owned(),
            name: DEFAULT_AGENT_NAME.to_owned(),
            project: None,
            task_types: Vec::new(),
            poll_interval: agent_kernel::DEFAULT_POLL_INTERVAL,
            request_timeout: Duration::from_secs(30),
            max_attempts: RetryPolicy::default().max_attempts().get(),
            max_concurrency: 1,
        }
    }
}

impl AgentConfig {
    /// Creates a configuration with defaults and the supplied API key.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::default().with_api_key(api_key)
    }

    /// Reads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a variable is set but malformed.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through an arbitrary variable lookup. Blank values
    /// count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a variable is set but malformed.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();
        config.api_key = get(ENV_API_KEY);
        if let Some(base_url) = get(ENV_BASE_URL) {
            config.base_url = base_url;
        }
        if let Some(name) = get(ENV_AGENT_NAME) {
            config.name = name;
        }
        config.project = get(ENV_PROJECT);
        if let Some(task_types) = get(ENV_TASK_TYPES) {
            config.task_types = task_types
                .split(',')
                .map(str::trim)
                .filter(|task_type| !task_type.is_empty())
                .map(ToOwned::to_owned)
                .collect();
        }
        if let Some(raw) = get(ENV_POLL_INTERVAL) {
            config.poll_interval = parse_seconds(ENV_POLL_INTERVAL, &raw)?;
        }
        if let Some(raw) = get(ENV_REQUEST_TIMEOUT) {
            config.request_timeout = parse_seconds(ENV_REQUEST_TIMEOUT, &raw)?;
        }
        if let Some(raw) = get(ENV_MAX_ATTEMPTS) {
            config.max_attempts = raw
                .parse::<u32>()
                .map_err(|err| ConfigError::invalid(ENV_MAX_ATTEMPTS, err.to_string()))?;
        }
        if let Some(raw) = get(ENV_MAX_CONCURRENCY) {
            config.max_concurrency = raw
                .parse::<usize>()
                .map_err(|err| ConfigError::invalid(ENV_MAX_CONCURRENCY, err.to_string()))?;
        }

        debug!(
            base_url = %config.base_url,
            name = %config.name,
            project = ?config.project,
            has_api_key = config.api_key.is_some(),
            "loaded agent configuration"
        );
        Ok(config)
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the API root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the agent name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Restricts polling to one project.
    #[must_use]
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Restricts polling to the given task types.
    #[must_use]
    pub fn with_task_types<I, S>(mut self, task_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.task_types = task_types.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the delay between poll cycles.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Sets the attempt ceiling for polling and action submission.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets how many executions of one batch may be processed concurrently.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Returns the agent name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the API root.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the project filter.
    #[must_use]
    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    /// Returns the task type filter.
    #[must_use]
    pub fn task_types(&self) -> &[String] {
        &self.task_types
    }

    /// Returns the poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Returns the per-request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Builds the validated agent identity.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingApiKey`] when no key is configured and
    /// [`ConfigError::Identity`] when a field fails validation.
    pub fn identity(&self) -> ConfigResult<AgentIdentity> {
        let api_key = self.api_key.clone().ok_or(ConfigError::MissingApiKey)?;
        let mut builder = AgentIdentity::builder(ApiKey::new(api_key)?)
            .name(self.name.clone())?
            .base_url(&self.base_url)?;
        if let Some(project) = &self.project {
            builder = builder.project(project.clone());
        }
        for task_type in &self.task_types {
            builder = builder.add_task_type(task_type.clone())?;
        }
        Ok(builder.build()?)
    }

    /// Builds transport settings for the given identity.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when the timeout is zero or the
    /// attempt ceiling is zero.
    pub fn transport_config(&self, identity: &AgentIdentity) -> ConfigResult<TransportConfig> {
        if self.request_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "request_timeout",
                "must be greater than zero",
            ));
        }
        let max_attempts = NonZeroU32::new(self.max_attempts)
            .ok_or_else(|| ConfigError::invalid("max_attempts", "must be at least 1"))?;
        let defaults = RetryPolicy::default();
        let retry = RetryPolicy::new(max_attempts, defaults.initial_delay(), defaults.max_delay());

        Ok(TransportConfig::from_identity(identity)
            .with_timeout(self.request_timeout)
            .with_retry(retry))
    }

    /// Builds poll loop settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when the poll interval or the
    /// concurrency limit is zero.
    pub fn poll_config(&self) -> ConfigResult<PollConfig> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::invalid(
                "poll_interval",
                "must be greater than zero",
            ));
        }
        let max_concurrency = NonZeroUsize::new(self.max_concurrency)
            .ok_or_else(|| ConfigError::invalid("max_concurrency", "must be at least 1"))?;
        Ok(PollConfig::new(self.poll_interval).with_max_concurrency(max_concurrency))
    }

    /// Builds an HTTPS-backed [`TaskAgent`] from this configuration.
    ///
    /// # Errors
    ///
    /// Returns any validation error from [`AgentConfig::identity`],
    /// [`AgentConfig::transport_config`], or [`AgentConfig::poll_config`], and
    /// [`ConfigError::Agent`] when the transport cannot be created.
    pub fn build_agent(&self) -> ConfigResult<TaskAgent> {
        let identity = self.identity()?;
        let transport = self.transport_config(&identity)?;
        let poll = self.poll_config()?;
        Ok(TaskAgent::connect(identity, transport)?.with_poll_config(poll)?)
    }
}

fn parse_seconds(key: &str, raw: &str) -> ConfigResult<Duration> {
    let secs: f64 = raw
        .parse()
        .map_err(|_| ConfigError::invalid(key, format!("`{raw}` is not a number of seconds")))?;
    Duration::try_from_secs_f64(secs)
        .map_err(|err| ConfigError::invalid(key, format!("`{raw}`: {err}")))
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, de::Error};

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}
