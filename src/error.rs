//! Error types for the conductor orchestration layer

use thiserror::Error;

/// Result type alias for conductor operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the orchestration layer
#[derive(Debug, Error)]
pub enum Error {
    /// A workflow or lookup referenced an agent that is not registered
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    /// An agent with the same id is already registered
    #[error("Duplicate agent: {0}")]
    DuplicateAgent(String),

    /// No agent matched the command and no usable fallback is configured
    #[error("No capable agent: {0}")]
    NoCapableAgent(String),

    /// A single agent invocation failed or timed out
    #[error("Agent invocation error: {agent}: {message}")]
    AgentInvocation { agent: String, message: String },

    /// Every dispatched agent of a workflow failed
    #[error("All agents failed: {}", .failures.join("; "))]
    AllAgentsFailed { failures: Vec<String> },

    /// Outcome store read or write failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Workflow state machine was asked to move backwards or out of a terminal state
    #[error("Invalid workflow transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an unknown agent error
    pub fn unknown_agent(agent_id: impl Into<String>) -> Self {
        Self::UnknownAgent(agent_id.into())
    }

    /// Create an agent invocation error
    pub fn agent_invocation(agent: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AgentInvocation {
            agent: agent.into(),
            message: message.into(),
        }
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// HTTP status a caller-facing surface should use for this error
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::UnknownAgent(_) => 404,
            Self::NoCapableAgent(_) => 503,
            Self::AgentInvocation { .. } | Self::AllAgentsFailed { .. } => 502,
            Self::Timeout(_) => 504,
            _ => 500,
        }
    }
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[cfg(feature = "storage")]
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
