//! Terminal decisions an agent relays for an execution.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, ExecutionId, SubmissionId};

/// Decision submitted for one execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Advance the item through the workflow.
    Approve,
    /// Send the item back for correction.
    Reject,
    /// Hand the item to a human reviewer.
    Flag,
    /// Acknowledge without taking a workflow action.
    Skip,
}

impl ActionKind {
    /// Returns the wire name of the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Flag => "flag",
            Self::Skip => "skip",
        }
    }
}

impl Display for ActionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            "flag" => Ok(Self::Flag),
            "skip" => Ok(Self::Skip),
            other => Err(Error::InvalidAction { name: other.into() }),
        }
    }
}

/// A single action submission, sent at most once per execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionSubmission {
    execution_id: ExecutionId,
    action: ActionKind,
    reason: Option<String>,
    submission_id: SubmissionId,
}

impl ActionSubmission {
    /// Creates a submission. Blank reasons are dropped.
    #[must_use]
    pub fn new(execution_id: ExecutionId, action: ActionKind, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            execution_id,
            action,
            reason: (!reason.trim().is_empty()).then_some(reason),
            submission_id: SubmissionId::random(),
        }
    }

    /// Returns the execution the action resolves.
    #[must_use]
    pub fn execution_id(&self) -> &ExecutionId {
        &self.execution_id
    }

    /// Returns the decision.
    #[must_use]
    pub const fn action(&self) -> ActionKind {
        self.action
    }

    /// Returns the optional human-readable reason.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Returns the idempotency identifier of this submission.
    #[must_use]
    pub const fn submission_id(&self) -> SubmissionId {
        self.submission_id
    }
}
