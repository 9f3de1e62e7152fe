//! Pending executions as returned by the platform.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ExecutionId;

/// One unit of pending work handed to the agent.
///
/// The event name is kept as the raw string so that executions for events this
/// client does not know can still be reported by id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    #[serde(rename = "uid")]
    execution_id: ExecutionId,
    event_type: String,
    #[serde(default)]
    event_payload: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
}

impl ExecutionRecord {
    /// Creates a record, mainly useful for tests and local replays.
    #[must_use]
    pub fn new(
        execution_id: ExecutionId,
        event_type: impl Into<String>,
        event_payload: Map<String, Value>,
    ) -> Self {
        Self {
            execution_id,
            event_type: event_type.into(),
            event_payload,
            created_at: None,
        }
    }

    /// Sets the creation timestamp.
    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Returns the execution identifier.
    #[must_use]
    pub fn execution_id(&self) -> &ExecutionId {
        &self.execution_id
    }

    /// Returns the raw event name.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Returns the event payload.
    #[must_use]
    pub fn payload(&self) -> &Map<String, Value> {
        &self.event_payload
    }

    /// Returns the task identifier from the payload, if present.
    #[must_use]
    pub fn task_id(&self) -> Option<&str> {
        self.event_payload.get("task_uid").and_then(Value::as_str)
    }

    /// Returns the project identifier from the payload, if present.
    #[must_use]
    pub fn project_id(&self) -> Option<&str> {
        self.event_payload.get("project_uid").and_then(Value::as_str)
    }

    /// Returns when the platform created the execution.
    #[must_use]
    pub const fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}
