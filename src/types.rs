//! Core type definitions for the orchestration layer

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a registered agent, unique within a registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Create an agent ID from a string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AgentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl PartialEq<str> for AgentId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for AgentId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Unique identifier for a workflow, generated per request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(Uuid);

impl WorkflowId {
    /// Create a new random workflow ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a workflow ID from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "workflow_{}", self.0.simple())
    }
}

/// Identifier handed out by an outcome store for a persisted record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutcomeId(String);

impl OutcomeId {
    /// Generate a fresh outcome ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an existing identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OutcomeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A caller's raw request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    text: String,
    received_at: DateTime<Utc>,
}

impl Command {
    /// Create a command, rejecting empty or whitespace-only text
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(Error::invalid_input("command text must not be empty"));
        }
        Ok(Self {
            text,
            received_at: Utc::now(),
        })
    }

    /// The command text as submitted
    pub fn text(&self) -> &str {
        &self.text
    }

    /// When the command was received
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_rejects_blank_text() {
        assert!(matches!(Command::new("   "), Err(Error::InvalidInput(_))));
        assert_eq!(Command::new("calculate 2 + 2").unwrap().text(), "calculate 2 + 2");
    }

    #[test]
    fn test_workflow_ids_are_unique() {
        let a = WorkflowId::new();
        let b = WorkflowId::new();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("workflow_"));
    }
}
