//! Transport seam between the agent kernel and the platform.

use std::collections::BTreeSet;

use agent_primitives::{ActionSubmission, AgentEvent, AgentIdentity, AgentToken, ExecutionRecord};
use async_trait::async_trait;

use crate::error::TransportResult;

/// Filters applied when fetching pending executions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PollFilters {
    project: Option<String>,
    task_types: BTreeSet<String>,
}

impl PollFilters {
    /// Filters matching everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives filters from the identity's project and task types.
    #[must_use]
    pub fn from_identity(identity: &AgentIdentity) -> Self {
        Self {
            project: identity.project().map(ToOwned::to_owned),
            task_types: identity.task_types().clone(),
        }
    }

    /// Restricts results to one project.
    #[must_use]
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Restricts results to the supplied task types.
    #[must_use]
    pub fn with_task_types<I, S>(mut self, task_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.task_types = task_types.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the project filter.
    #[must_use]
    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    /// Returns the task type filter.
    #[must_use]
    pub fn task_types(&self) -> &BTreeSet<String> {
        &self.task_types
    }
}

/// Platform acknowledgement of an action submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionAck {
    /// The action was recorded.
    Accepted,
    /// The platform already holds an action for this execution.
    AlreadySatisfied,
}

/// Trait implemented by platform transports.
#[async_trait]
pub trait PlatformTransport: Send + Sync {
    /// Registers the agent and returns the token used for polling.
    async fn register(
        &self,
        identity: &AgentIdentity,
        events: &[AgentEvent],
    ) -> TransportResult<AgentToken>;

    /// Fetches executions waiting for this agent, in platform order.
    async fn fetch_pending(
        &self,
        token: &AgentToken,
        filters: &PollFilters,
    ) -> TransportResult<Vec<ExecutionRecord>>;

    /// Submits the decision for one execution.
    async fn post_action(&self, submission: &ActionSubmission) -> TransportResult<ActionAck>;
}
