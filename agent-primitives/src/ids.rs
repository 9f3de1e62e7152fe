//! Identifier types.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

/// Identifier of one pending execution on the platform.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ExecutionId(String);

impl ExecutionId {
    /// Creates an execution identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] if the identifier is blank.
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::InvalidId {
                kind: "execution",
                reason: "identifier cannot be empty".into(),
            });
        }
        Ok(Self(id))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ExecutionId {
    type Error = Error;

    fn try_from(id: String) -> crate::Result<Self> {
        Self::new(id)
    }
}

impl From<ExecutionId> for String {
    fn from(id: ExecutionId) -> Self {
        id.0
    }
}

impl Display for ExecutionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque agent identifier handed out by the platform on registration.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct AgentToken(String);

impl AgentToken {
    /// Wraps a token returned by the platform.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] if the token is blank.
    pub fn new(token: impl Into<String>) -> crate::Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(Error::InvalidId {
                kind: "agent",
                reason: "token cannot be empty".into(),
            });
        }
        Ok(Self(token))
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AgentToken {
    type Error = Error;

    fn try_from(token: String) -> crate::Result<Self> {
        Self::new(token)
    }
}

impl From<AgentToken> for String {
    fn from(token: AgentToken) -> Self {
        token.0
    }
}

impl Display for AgentToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Client-generated identifier attached to an action submission.
///
/// Retries of the same submission reuse the identifier so the platform can
/// recognise duplicates.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(Uuid);

impl SubmissionId {
    /// Generates a random submission identifier.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl Display for SubmissionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl FromStr for SubmissionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::parse_str(s).map_err(Error::from)?;
        Ok(Self(uuid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_ids_are_rejected() {
        assert!(ExecutionId::new("  ").is_err());
        assert!(AgentToken::new("").is_err());
    }

    #[test]
    fn blank_ids_are_rejected_when_deserialized() {
        assert!(serde_json::from_str::<ExecutionId>(r#"" ""#).is_err());
        assert!(serde_json::from_str::<AgentToken>(r#""""#).is_err());

        let id: ExecutionId = serde_json::from_str(r#""E1""#).unwrap();
        assert_eq!(id.as_str(), "E1");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""E1""#);
    }

    #[test]
    fn submission_id_parses_its_display_form() {
        let id = SubmissionId::random();
        let parsed = id.to_string().parse::<SubmissionId>().expect("parse");
        assert_eq!(id, parsed);
    }
}
