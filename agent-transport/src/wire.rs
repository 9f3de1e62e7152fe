//! JSON bodies exchanged with the agent API.

use agent_primitives::{ActionKind, ExecutionRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Registration payload sent to `agents/`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisterRequest {
    /// Agent display name.
    pub name: String,
    /// Events the agent has handlers for.
    pub events: Vec<String>,
    /// Optional project filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Optional task type filter.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub task_types: Vec<String>,
}

/// Successful registration response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    /// Agent identifier used for subsequent polls.
    #[serde(default)]
    pub uid: Option<String>,
    /// Echoed agent name.
    #[serde(default)]
    pub name: Option<String>,
}

/// Pending executions come back either as a bare list or paginated.
///
/// Entries stay raw until [`PendingPage::into_records`] so one bad record
/// cannot spoil the page.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PendingPage {
    /// Bare JSON array.
    List(Vec<Value>),
    /// Paginated envelope.
    Paginated {
        /// Records on this page.
        #[serde(default)]
        results: Vec<Value>,
    },
}

impl PendingPage {
    /// Decodes each entry on its own and returns the valid records in platform order.
    ///
    /// Entries that do not decode are logged and dropped.
    #[must_use]
    pub fn into_records(self) -> Vec<ExecutionRecord> {
        let entries = match self {
            Self::List(entries) | Self::Paginated { results: entries } => entries,
        };
        entries
            .into_iter()
            .filter_map(|entry| {
                let uid = entry
                    .get("uid")
                    .and_then(Value::as_str)
                    .map(ToOwned::to_owned);
                match serde_json::from_value::<ExecutionRecord>(entry) {
                    Ok(record) => Some(record),
                    Err(err) => {
                        warn!(
                            uid = uid.as_deref().unwrap_or("<unknown>"),
                            error = %err,
                            "dropping undecodable execution"
                        );
                        None
                    }
                }
            })
            .collect()
    }
}

/// Action payload sent to `agent-actions/`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionRequest {
    /// Execution being resolved.
    pub execution: String,
    /// Decision.
    pub action: ActionKind,
    /// Optional explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Structured error body; the platform uses either `detail` or `error`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorResponse {
    /// Django REST style message.
    #[serde(default)]
    pub detail: Option<String>,
    /// Alternate message field.
    #[serde(default)]
    pub error: Option<String>,
    /// Machine readable error code.
    #[serde(default)]
    pub code: Option<String>,
}

impl ErrorResponse {
    /// Extracts a readable message from a response body, falling back to raw text.
    #[must_use]
    pub fn describe(body: &[u8]) -> String {
        let parsed: Option<Self> = serde_json::from_slice(body).ok();
        let message = parsed.and_then(|err| {
            let message = err.detail.or(err.error)?;
            Some(match err.code {
                Some(code) => format!("{message} ({code})"),
                None => message,
            })
        });
        message.unwrap_or_else(|| {
            let text = String::from_utf8_lossy(body);
            let trimmed = text.trim();
            if trimmed.is_empty() {
                "empty response body".to_owned()
            } else {
                trimmed.chars().take(512).collect()
            }
        })
    }
}
