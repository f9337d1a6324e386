//! Workflow model and state machine

use crate::error::{Error, Result};
use crate::types::{AgentId, Command, WorkflowId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Instant;

/// Execution mode chosen by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowMode {
    /// One agent handles the command
    Single,
    /// Several agents run concurrently and their outputs are synthesized
    Collaborative,
}

impl fmt::Display for WorkflowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Collaborative => write!(f, "collaborative"),
        }
    }
}

/// Workflow lifecycle states, ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// Classification finished, nothing dispatched yet
    Classified,
    /// Invocations started
    Dispatched,
    /// Waiting for every invocation to finish or time out
    Aggregating,
    /// Collaborative outputs merged
    Synthesized,
    /// Terminal success
    Complete,
    /// Terminal failure
    Failed,
}

impl WorkflowState {
    /// Whether no further transition is allowed
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Classified => "classified",
            Self::Dispatched => "dispatched",
            Self::Aggregating => "aggregating",
            Self::Synthesized => "synthesized",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// One execution of a command
#[derive(Debug, Clone)]
pub struct Workflow {
    /// Unique per request
    pub workflow_id: WorkflowId,
    /// Execution mode
    pub mode: WorkflowMode,
    /// Target agents in dispatch order, never empty
    pub agent_ids: Vec<AgentId>,
    /// The command being processed
    pub command: Command,
    state: WorkflowState,
    started_at: Instant,
}

impl Workflow {
    /// Create a classified workflow; `started_at` is the classification start
    pub fn new(
        command: Command,
        mode: WorkflowMode,
        agent_ids: Vec<AgentId>,
        started_at: Instant,
    ) -> Result<Self> {
        if agent_ids.is_empty() {
            return Err(Error::invalid_input("workflow needs at least one agent"));
        }
        if mode == WorkflowMode::Collaborative && agent_ids.len() < 2 {
            return Err(Error::invalid_input("collaborative workflow needs at least two agents"));
        }
        Ok(Self {
            workflow_id: WorkflowId::new(),
            mode,
            agent_ids,
            command,
            state: WorkflowState::Classified,
            started_at,
        })
    }

    /// Current state
    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// Move forward; states are never revisited and terminal states are final
    pub fn advance(&mut self, next: WorkflowState) -> Result<()> {
        let allowed = !self.state.is_terminal()
            && next > self.state
            && !(next == WorkflowState::Synthesized && self.mode == WorkflowMode::Single);
        if !allowed {
            return Err(Error::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }

        tracing::debug!(
            workflow_id = %self.workflow_id,
            from = %self.state,
            to = %next,
            "Workflow transition"
        );
        self.state = next;
        Ok(())
    }

    /// Milliseconds since classification started
    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }
}

/// One agent's raw output within a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInvocationResult {
    /// Agent that produced the result
    pub agent_id: AgentId,
    /// Agent type label
    pub agent_type: String,
    /// Whether the invocation succeeded
    pub success: bool,
    /// Opaque payload, `null` on failure
    pub payload: Value,
    /// Invocation latency in milliseconds
    pub latency_ms: u64,
    /// Error message on failure or timeout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentInvocationResult {
    /// Successful invocation
    pub fn success(agent_id: AgentId, agent_type: impl Into<String>, payload: Value, latency_ms: u64) -> Self {
        Self {
            agent_id,
            agent_type: agent_type.into(),
            success: true,
            payload,
            latency_ms,
            error: None,
        }
    }

    /// Failed or timed-out invocation
    pub fn failure(
        agent_id: AgentId,
        agent_type: impl Into<String>,
        error: impl Into<String>,
        latency_ms: u64,
    ) -> Self {
        Self {
            agent_id,
            agent_type: agent_type.into(),
            success: false,
            payload: Value::Null,
            latency_ms,
            error: Some(error.into()),
        }
    }

    /// `"<agent>: <error>"` line used in aggregate failures
    pub fn failure_summary(&self) -> String {
        format!(
            "{}: {}",
            self.agent_id,
            self.error.as_deref().unwrap_or("unknown error")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workflow(mode: WorkflowMode, ids: &[&str]) -> Workflow {
        Workflow::new(
            Command::new("test").unwrap(),
            mode,
            ids.iter().map(|id| AgentId::new(*id)).collect(),
            Instant::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_collaborative_path_is_monotonic() {
        let mut wf = workflow(WorkflowMode::Collaborative, &["a", "b"]);
        wf.advance(WorkflowState::Dispatched).unwrap();
        wf.advance(WorkflowState::Aggregating).unwrap();
        wf.advance(WorkflowState::Synthesized).unwrap();
        wf.advance(WorkflowState::Complete).unwrap();

        assert!(wf.advance(WorkflowState::Failed).is_err());
        assert_eq!(wf.state(), WorkflowState::Complete);
    }

    #[test]
    fn test_single_mode_skips_synthesis() {
        let mut wf = workflow(WorkflowMode::Single, &["a"]);
        wf.advance(WorkflowState::Dispatched).unwrap();
        assert!(matches!(
            wf.advance(WorkflowState::Synthesized),
            Err(Error::InvalidTransition { .. })
        ));
        wf.advance(WorkflowState::Complete).unwrap();
    }

    #[test]
    fn test_states_are_never_revisited() {
        let mut wf = workflow(WorkflowMode::Single, &["a"]);
        wf.advance(WorkflowState::Aggregating).unwrap();
        assert!(wf.advance(WorkflowState::Dispatched).is_err());
        assert!(wf.advance(WorkflowState::Aggregating).is_err());
        wf.advance(WorkflowState::Failed).unwrap();
    }

    #[test]
    fn test_empty_target_list_is_rejected() {
        let result = Workflow::new(
            Command::new("x").unwrap(),
            WorkflowMode::Single,
            Vec::new(),
            Instant::now(),
        );
        assert!(result.is_err());
    }
}
