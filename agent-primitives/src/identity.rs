//! Agent identity and credentials presented to the platform.

use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Error, Result};

/// Name used when the caller does not supply one.
pub const DEFAULT_AGENT_NAME: &str = "default-agent";

/// Production API root.
pub const DEFAULT_BASE_URL: &str = "https://api.avala.ai/api/v1/";

const MAX_NAME_LEN: usize = 128;

/// Secret API key. Never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wraps an API key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] when the key is blank.
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(Error::identity("api key cannot be empty"));
        }
        Ok(Self(key))
    }

    /// Returns the raw key for use in request headers.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Who the agent is and which executions it wants to see.
#[derive(Clone, Debug)]
pub struct AgentIdentity {
    api_key: ApiKey,
    base_url: String,
    name: String,
    project: Option<String>,
    task_types: BTreeSet<String>,
}

impl AgentIdentity {
    /// Starts building an [`AgentIdentity`].
    #[must_use]
    pub fn builder(api_key: ApiKey) -> AgentIdentityBuilder {
        AgentIdentityBuilder {
            api_key,
            base_url: None,
            name: None,
            project: None,
            task_types: BTreeSet::new(),
        }
    }

    /// Returns the credential.
    #[must_use]
    pub fn api_key(&self) -> &ApiKey {
        &self.api_key
    }

    /// Returns the API root, always ending with `/`.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the agent display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the optional project filter.
    #[must_use]
    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    /// Returns the task type filter; empty means no filtering.
    #[must_use]
    pub fn task_types(&self) -> &BTreeSet<String> {
        &self.task_types
    }
}

/// Builder for [`AgentIdentity`].
#[derive(Debug)]
pub struct AgentIdentityBuilder {
    api_key: ApiKey,
    base_url: Option<String>,
    name: Option<String>,
    project: Option<String>,
    task_types: BTreeSet<String>,
}

impl AgentIdentityBuilder {
    /// Sets the agent name shown in the platform dashboard.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] when the name is empty or too long.
    pub fn name(mut self, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::identity("agent name cannot be empty"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(Error::identity(format!(
                "agent name length must be <= {MAX_NAME_LEN}"
            )));
        }
        self.name = Some(name);
        Ok(self)
    }

    /// Overrides the API root.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] when the URL does not use http or https.
    pub fn base_url(mut self, base_url: impl AsRef<str>) -> Result<Self> {
        self.base_url = Some(sanitize_base_url(base_url.as_ref())?);
        Ok(self)
    }

    /// Restricts polling to a single project. Blank values clear the filter.
    #[must_use]
    pub fn project(mut self, project: impl Into<String>) -> Self {
        let project = project.into();
        self.project = (!project.trim().is_empty()).then_some(project);
        self
    }

    /// Adds a task type to the filter set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] when the task type is blank or contains
    /// a comma, which the platform uses as a list separator.
    pub fn add_task_type(mut self, task_type: impl Into<String>) -> Result<Self> {
        let task_type = task_type.into();
        let trimmed = task_type.trim();
        if trimmed.is_empty() {
            return Err(Error::identity("task type cannot be empty"));
        }
        if trimmed.contains(',') {
            return Err(Error::identity(format!(
                "task type `{trimmed}` must not contain commas"
            )));
        }
        self.task_types.insert(trimmed.to_owned());
        Ok(self)
    }

    /// Finalises the identity, applying defaults for name and base URL.
    ///
    /// # Errors
    ///
    /// Currently infallible.
    pub fn build(self) -> Result<AgentIdentity> {
        Ok(AgentIdentity {
            api_key: self.api_key,
            base_url: self.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()),
            name: self.name.unwrap_or_else(|| DEFAULT_AGENT_NAME.to_owned()),
            project: self.project,
            task_types: self.task_types,
        })
    }
}

fn sanitize_base_url(input: &str) -> Result<String> {
    let mut base = input.trim().to_owned();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(Error::identity(
            "base URL must start with http:// or https://",
        ));
    }
    if !base.ends_with('/') {
        base.push('/');
    }
    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ApiKey {
        ApiKey::new("avk_test").unwrap()
    }

    #[test]
    fn defaults_apply() {
        let identity = AgentIdentity::builder(key()).build().unwrap();
        assert_eq!(identity.name(), DEFAULT_AGENT_NAME);
        assert_eq!(identity.base_url(), DEFAULT_BASE_URL);
        assert_eq!(identity.project(), None);
        assert!(identity.task_types().is_empty());
    }

    #[test]
    fn builds_filtered_identity() {
        let identity = AgentIdentity::builder(key())
            .name("quality-checker")
            .unwrap()
            .base_url("http://localhost:8000/api/v1")
            .unwrap()
            .project("proj-x")
            .add_task_type("bounding_box")
            .unwrap()
            .add_task_type(" polygon ")
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(identity.base_url(), "http://localhost:8000/api/v1/");
        assert_eq!(identity.project(), Some("proj-x"));
        let types: Vec<_> = identity.task_types().iter().map(String::as_str).collect();
        assert_eq!(types, ["bounding_box", "polygon"]);
    }

    #[test]
    fn rejects_bad_inputs() {
        assert!(ApiKey::new(" ").is_err());
        assert!(AgentIdentity::builder(key()).name("").is_err());
        assert!(AgentIdentity::builder(key()).base_url("api.avala.ai").is_err());
        assert!(AgentIdentity::builder(key()).add_task_type("a,b").is_err());
    }

    #[test]
    fn api_key_is_redacted() {
        let identity = AgentIdentity::builder(key()).build().unwrap();
        let rendered = format!("{identity:?}");
        assert!(!rendered.contains("avk_test"));
        assert!(rendered.contains("ApiKey(***)"));
    }
}
