//! Identifier newtypes shared across the fleet core.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("invalid home id {0:?}: expected \"agentId@nodeId\"")]
    InvalidHomeId(String),
    #[error("invalid channel id {0:?}: expected to match ^[a-zA-Z0-9][a-zA-Z0-9-]*$")]
    InvalidChannelId(String),
}

/// `agentId@nodeId` — the key of one agent's residency on one node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HomeId {
    pub agent_id: String,
    pub node_id: String,
}

impl HomeId {
    pub fn new(agent_id: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            node_id: node_id.into(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, IdError> {
        let (agent_id, node_id) = raw
            .split_once('@')
            .ok_or_else(|| IdError::InvalidHomeId(raw.to_string()))?;
        if agent_id.is_empty() || node_id.is_empty() {
            return Err(IdError::InvalidHomeId(raw.to_string()));
        }
        Ok(Self::new(agent_id, node_id))
    }
}

impl fmt::Display for HomeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.agent_id, self.node_id)
    }
}

impl TryFrom<String> for HomeId {
    type Error = IdError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<HomeId> for String {
    fn from(value: HomeId) -> Self {
        value.to_string()
    }
}

/// A validated channel identifier: `^[a-zA-Z0-9][a-zA-Z0-9-]*$`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelId(String);

impl ChannelId {
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        if is_valid_channel_id(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(IdError::InvalidChannelId(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_valid_channel_id(raw: &str) -> bool {
    let mut chars = raw.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_alphanumeric() {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ChannelId {
    type Error = IdError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ChannelId> for String {
    fn from(value: ChannelId) -> Self {
        value.0
    }
}

/// Returns true if `member_id` is excluded from archive-readiness and
/// tick-notification counting (humans and synthetic identifiers).
pub fn is_synthetic_or_human(member_id: &str) -> bool {
    member_id.starts_with("human:") || member_id == "main" || member_id == "unknown"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_home_id() {
        let home = HomeId::parse("alice@n1").unwrap();
        assert_eq!(home.agent_id, "alice");
        assert_eq!(home.node_id, "n1");
        assert_eq!(home.to_string(), "alice@n1");
    }

    #[test]
    fn rejects_home_id_without_at() {
        assert!(HomeId::parse("alice").is_err());
    }

    #[test]
    fn validates_channel_id() {
        assert!(ChannelId::parse("proj-1").is_ok());
        assert!(ChannelId::parse("-proj").is_err());
        assert!(ChannelId::parse("").is_err());
        assert!(ChannelId::parse("proj_1").is_err());
    }

    #[test]
    fn recognizes_synthetic_and_human_ids() {
        assert!(is_synthetic_or_human("human:operator"));
        assert!(is_synthetic_or_human("main"));
        assert!(is_synthetic_or_human("unknown"));
        assert!(!is_synthetic_or_human("alice"));
    }
}
