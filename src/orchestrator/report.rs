//! Execution report types

use crate::error::Result;
use crate::orchestrator::synthesizer::SynthesizedResult;
use crate::types::AgentId;
use crate::workflow::{AgentInvocationResult, Workflow};

/// Final answer of a successful workflow
#[derive(Debug, Clone)]
pub enum WorkflowOutput {
    /// The one agent's result
    Single(AgentInvocationResult),
    /// Merged collaborative result
    Collaborative(SynthesizedResult),
}

/// Everything the executor knows once a workflow is terminal
#[derive(Debug)]
pub struct ExecutionReport {
    /// Workflow in `Complete` or `Failed`
    pub workflow: Workflow,
    /// One entry per dispatched agent, dispatch order
    pub results: Vec<AgentInvocationResult>,
    /// Final answer or the error that ended the workflow
    pub outcome: Result<WorkflowOutput>,
    /// Classification start to terminal state
    pub processing_time_ms: u64,
}

impl ExecutionReport {
    /// Agents that were actually dispatched
    pub fn dispatched_agents(&self) -> Vec<AgentId> {
        self.results.iter().map(|r| r.agent_id.clone()).collect()
    }

    /// Whether the workflow ended in `Complete`
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}
