//! Workflow executor
//!
//! Single workflows make one awaited call. Collaborative workflows spawn one
//! task per target, each bound by the per-agent timeout and by the overall
//! workflow deadline, and join them in dispatch order before synthesis.

use crate::agent::AgentDescriptor;
use crate::config::ExecutorConfig;
use crate::error::{Error, Result};
use crate::orchestrator::report::{ExecutionReport, WorkflowOutput};
use crate::orchestrator::synthesizer::ResultSynthesizer;
use crate::registry::AgentRegistry;
use crate::types::Command;
use crate::workflow::{AgentInvocationResult, Workflow, WorkflowMode, WorkflowState};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Drives workflows from `Classified` to a terminal state
pub struct WorkflowExecutor {
    registry: Arc<AgentRegistry>,
    config: ExecutorConfig,
    synthesizer: ResultSynthesizer,
}

impl WorkflowExecutor {
    /// Create an executor
    pub fn new(registry: Arc<AgentRegistry>, config: ExecutorConfig) -> Self {
        Self {
            registry,
            config,
            synthesizer: ResultSynthesizer::default(),
        }
    }

    /// Set the synthesizer
    pub fn with_synthesizer(mut self, synthesizer: ResultSynthesizer) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    /// Run a classified workflow to completion; never returns early on agent errors
    pub async fn execute(&self, mut workflow: Workflow) -> ExecutionReport {
        let mut results = Vec::new();
        let outcome = self.run(&mut workflow, &mut results).await;

        if outcome.is_err() && !workflow.state().is_terminal() {
            // Any non-terminal state may move to Failed
            let _ = workflow.advance(WorkflowState::Failed);
        }

        let processing_time_ms = workflow.elapsed_ms();
        match &outcome {
            Ok(_) => tracing::info!(
                workflow_id = %workflow.workflow_id,
                mode = %workflow.mode,
                processing_time_ms,
                "Workflow complete"
            ),
            Err(e) => tracing::warn!(
                workflow_id = %workflow.workflow_id,
                mode = %workflow.mode,
                processing_time_ms,
                error = %e,
                "Workflow failed"
            ),
        }

        ExecutionReport {
            workflow,
            results,
            outcome,
            processing_time_ms,
        }
    }

    async fn run(
        &self,
        workflow: &mut Workflow,
        results: &mut Vec<AgentInvocationResult>,
    ) -> Result<WorkflowOutput> {
        // Targets must still be registered; nothing is invoked otherwise
        let descriptors = workflow
            .agent_ids
            .iter()
            .map(|id| self.registry.lookup(id))
            .collect::<Result<Vec<_>>>()?;

        workflow.advance(WorkflowState::Dispatched)?;
        tracing::info!(
            workflow_id = %workflow.workflow_id,
            mode = %workflow.mode,
            agents = ?workflow.agent_ids,
            "Dispatching workflow"
        );

        match workflow.mode {
            WorkflowMode::Single => {
                workflow.advance(WorkflowState::Aggregating)?;
                let result = self.invoke_single(&descriptors[0], &workflow.command).await;
                results.push(result.clone());

                if !result.success {
                    return Err(Error::agent_invocation(
                        result.agent_id.as_str(),
                        result.error.unwrap_or_default(),
                    ));
                }
                workflow.advance(WorkflowState::Complete)?;
                Ok(WorkflowOutput::Single(result))
            }
            WorkflowMode::Collaborative => {
                let dispatched = self.dispatch_all(&descriptors, &workflow.command);
                workflow.advance(WorkflowState::Aggregating)?;
                results.extend(dispatched.await);

                if results.iter().all(|r| !r.success) {
                    return Err(Error::AllAgentsFailed {
                        failures: results.iter().map(|r| r.failure_summary()).collect(),
                    });
                }

                let synthesized = self.synthesizer.synthesize(results)?;
                workflow.advance(WorkflowState::Synthesized)?;
                workflow.advance(WorkflowState::Complete)?;
                Ok(WorkflowOutput::Collaborative(synthesized))
            }
        }
    }

    /// Runs in its own task so a panicking agent becomes a failed result
    async fn invoke_single(&self, descriptor: &AgentDescriptor, command: &Command) -> AgentInvocationResult {
        let limit = self.config.agent_timeout().min(self.config.workflow_timeout());
        let started = Instant::now();
        let handle = descriptor.handle();
        let command = command.clone();
        let mut task = tokio::spawn(async move { handle.invoke(&command).await });
        let outcome = tokio::time::timeout(limit, &mut task).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let agent_id = descriptor.agent_id.clone();
        let agent_type = &descriptor.agent_type;
        match outcome {
            Ok(Ok(Ok(payload))) => AgentInvocationResult::success(agent_id, agent_type, payload, latency_ms),
            Ok(Ok(Err(e))) => {
                tracing::warn!(agent_id = %agent_id, error = %e, "Agent failed");
                AgentInvocationResult::failure(agent_id, agent_type, e.to_string(), latency_ms)
            }
            Ok(Err(join_error)) => {
                tracing::error!(agent_id = %agent_id, error = %join_error, "Agent task aborted");
                AgentInvocationResult::failure(
                    agent_id,
                    agent_type,
                    format!("agent task failed: {}", join_error),
                    latency_ms,
                )
            }
            Err(_) => {
                task.abort();
                tracing::warn!(agent_id = %agent_id, timeout_ms = limit.as_millis() as u64, "Agent timed out");
                AgentInvocationResult::failure(agent_id, agent_type, timeout_message(limit), latency_ms)
            }
        }
    }

    /// Spawn every invocation now; the returned future joins them in dispatch order
    fn dispatch_all(
        &self,
        descriptors: &[Arc<AgentDescriptor>],
        command: &Command,
    ) -> impl std::future::Future<Output = Vec<AgentInvocationResult>> {
        let dispatched_at = Instant::now();
        let workflow_deadline = dispatched_at + self.config.workflow_timeout();
        let agent_deadline = (dispatched_at + self.config.agent_timeout()).min(workflow_deadline);
        let limit = agent_deadline - dispatched_at;
        let command = Arc::new(command.clone());

        let waits: Vec<_> = descriptors
            .iter()
            .map(|descriptor| {
                let handle = descriptor.handle();
                let command = Arc::clone(&command);
                let mut task = tokio::spawn(async move {
                    let started = Instant::now();
                    let outcome = handle.invoke(&command).await;
                    (outcome, started.elapsed().as_millis() as u64)
                });

                let agent_id = descriptor.agent_id.clone();
                let agent_type = descriptor.agent_type.clone();
                async move {
                    match tokio::time::timeout_at(agent_deadline, &mut task).await {
                        Ok(Ok((Ok(payload), latency_ms))) => {
                            tracing::debug!(agent_id = %agent_id, latency_ms, "Agent succeeded");
                            AgentInvocationResult::success(agent_id, agent_type, payload, latency_ms)
                        }
                        Ok(Ok((Err(e), latency_ms))) => {
                            tracing::warn!(agent_id = %agent_id, error = %e, "Agent failed");
                            AgentInvocationResult::failure(agent_id, agent_type, e.to_string(), latency_ms)
                        }
                        Ok(Err(join_error)) => {
                            tracing::error!(agent_id = %agent_id, error = %join_error, "Agent task aborted");
                            AgentInvocationResult::failure(
                                agent_id,
                                agent_type,
                                format!("agent task failed: {}", join_error),
                                dispatched_at.elapsed().as_millis() as u64,
                            )
                        }
                        Err(_) => {
                            task.abort();
                            tracing::warn!(agent_id = %agent_id, timeout_ms = limit.as_millis() as u64, "Agent timed out");
                            AgentInvocationResult::failure(
                                agent_id,
                                agent_type,
                                timeout_message(limit),
                                dispatched_at.elapsed().as_millis() as u64,
                            )
                        }
                    }
                }
            })
            .collect();

        join_all(waits)
    }
}

fn timeout_message(limit: Duration) -> String {
    format!("timed out after {} ms", limit.as_millis())
}
