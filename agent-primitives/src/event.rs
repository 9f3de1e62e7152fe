//! Lifecycle events emitted by the annotation platform.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Events an agent may subscribe to.
///
/// The set is closed: the platform may emit other event names, but those are
/// rejected at registration time and reported as unknown at dispatch time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgentEvent {
    /// An annotator submitted a result for review.
    #[serde(rename = "result.submitted")]
    ResultSubmitted,
    /// A result was accepted by a reviewer.
    #[serde(rename = "result.accepted")]
    ResultAccepted,
    /// A result was rejected by a reviewer.
    #[serde(rename = "result.rejected")]
    ResultRejected,
    /// A task finished its workflow.
    #[serde(rename = "task.completed")]
    TaskCompleted,
}

/// Payload family of an event, deciding which context projection is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventFamily {
    /// Payload carries result-level data.
    Result,
    /// Payload carries task-level data.
    Task,
}

impl AgentEvent {
    /// Every supported event, in a stable order.
    pub const ALL: [Self; 4] = [
        Self::ResultSubmitted,
        Self::ResultAccepted,
        Self::ResultRejected,
        Self::TaskCompleted,
    ];

    /// Returns the wire name of the event.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ResultSubmitted => "result.submitted",
            Self::ResultAccepted => "result.accepted",
            Self::ResultRejected => "result.rejected",
            Self::TaskCompleted => "task.completed",
        }
    }

    /// Returns the payload family of the event.
    #[must_use]
    pub const fn family(self) -> EventFamily {
        match self {
            Self::ResultSubmitted | Self::ResultAccepted | Self::ResultRejected => {
                EventFamily::Result
            }
            Self::TaskCompleted => EventFamily::Task,
        }
    }

    fn supported_list() -> String {
        Self::ALL
            .iter()
            .map(|event| event.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Display for AgentEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentEvent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| Error::InvalidEvent {
                name: s.to_owned(),
                supported: Self::supported_list(),
            })
    }
}
