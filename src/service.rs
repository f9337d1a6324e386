//! Command service
//!
//! Caller-facing entry point: validates the request, classifies it, runs the
//! workflow, persists one outcome per dispatched agent and shapes the response.
//! Persistence problems are logged and reported in the `storage` block; they
//! never turn a successful answer into an error.

use crate::agent::AgentInfo;
use crate::classifier::CommandClassifier;
use crate::context::ConductorContext;
use crate::error::{Error, Result};
use crate::orchestrator::{ExecutionReport, WorkflowExecutor, WorkflowOutput};
use crate::storage::{AgentStats, OutcomeRecord, StoredOutcome};
use crate::types::{AgentId, Command, OutcomeId};
use crate::workflow::WorkflowMode;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Incoming request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Free-text command
    pub command: String,
}

impl CommandRequest {
    /// Create a request
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

/// Collaborative workflow details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborationInfo {
    /// Agents that were actually dispatched
    pub agents_involved: Vec<AgentId>,
    /// Workflow identifier, unique per request
    pub workflow_id: String,
}

/// Persistence acknowledgement attached to successful responses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageReport {
    /// Whether every outcome was stored; `outcome_ids` may be partial when false
    pub stored: bool,
    /// Identifiers of the stored outcomes
    pub outcome_ids: Vec<OutcomeId>,
}

/// Body of a successful response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    /// Agent type, or `collaborative`
    #[serde(rename = "type")]
    pub response_type: String,
    /// Agent that answered a single workflow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_used: Option<AgentId>,
    /// Present for collaborative workflows only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collaboration_info: Option<CollaborationInfo>,
    /// Agent payload or `{final_result, agent_results}`
    pub result: Value,
    /// Classification start to terminal state
    pub processing_time_ms: u64,
    /// Persistence acknowledgement
    pub storage: StorageReport,
}

/// Response returned to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandResponse {
    /// The workflow completed
    Success(SuccessResponse),
    /// The request was rejected or the workflow failed
    Error {
        /// Human-readable reason
        message: String,
        /// HTTP status for the failure
        #[serde(skip, default = "internal_error_status")]
        status_code: u16,
    },
}

fn internal_error_status() -> u16 {
    500
}

impl CommandResponse {
    /// Error response for an orchestration error
    pub fn from_error(err: &Error) -> Self {
        Self::Error {
            message: err.to_string(),
            status_code: err.http_status(),
        }
    }

    /// 200 on success, the error's mapped status otherwise
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Success(_) => 200,
            Self::Error { status_code, .. } => *status_code,
        }
    }

    /// Whether the response reports success
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Success body, if any
    pub fn success(&self) -> Option<&SuccessResponse> {
        match self {
            Self::Success(body) => Some(body),
            Self::Error { .. } => None,
        }
    }
}

/// Handles commands end-to-end
pub struct CommandService {
    context: ConductorContext,
    classifier: CommandClassifier,
    executor: WorkflowExecutor,
}

impl CommandService {
    /// Build the classifier and executor from the context configuration
    pub fn new(context: ConductorContext) -> Self {
        let classifier = CommandClassifier::new(context.config.classifier.clone());
        let executor = WorkflowExecutor::new(context.registry.clone(), context.config.executor.clone());
        Self {
            context,
            classifier,
            executor,
        }
    }

    /// Shared context
    pub fn context(&self) -> &ConductorContext {
        &self.context
    }

    /// Process one request
    #[tracing::instrument(skip(self, request), fields(command_len = request.command.len()))]
    pub async fn handle(&self, request: CommandRequest) -> CommandResponse {
        match self.process(request).await {
            Ok(body) => CommandResponse::Success(body),
            Err(e) => {
                tracing::warn!(error = %e, status = e.http_status(), "Command failed");
                CommandResponse::from_error(&e)
            }
        }
    }

    /// Convenience wrapper around [`CommandService::handle`]
    pub async fn handle_text(&self, command: &str) -> CommandResponse {
        self.handle(CommandRequest::new(command)).await
    }

    async fn process(&self, request: CommandRequest) -> Result<SuccessResponse> {
        let command = Command::new(request.command)?;
        let snapshot = self.context.registry.snapshot();
        let classification = self.classifier.classify(command, &snapshot)?;

        tracing::info!(
            workflow_id = %classification.workflow.workflow_id,
            mode = %classification.workflow.mode,
            agents = ?classification.workflow.agent_ids,
            used_fallback = classification.used_fallback,
            "Command classified"
        );

        let report = self.executor.execute(classification.workflow).await;
        let storage = self.persist(&report).await;
        let ExecutionReport {
            workflow,
            results,
            outcome,
            processing_time_ms,
        } = report;

        match outcome? {
            WorkflowOutput::Single(result) => Ok(SuccessResponse {
                response_type: result.agent_type.clone(),
                agent_used: Some(result.agent_id.clone()),
                collaboration_info: None,
                result: result.payload,
                processing_time_ms,
                storage,
            }),
            WorkflowOutput::Collaborative(synthesized) => Ok(SuccessResponse {
                response_type: "collaborative".to_string(),
                agent_used: None,
                collaboration_info: Some(CollaborationInfo {
                    agents_involved: results.iter().map(|r| r.agent_id.clone()).collect(),
                    workflow_id: workflow.workflow_id.to_string(),
                }),
                result: json!({
                    "final_result": synthesized,
                    "agent_results": results,
                }),
                processing_time_ms,
                storage,
            }),
        }
    }

    /// Store one record per dispatched agent, for completed and failed workflows alike
    ///
    /// Stops at the first failed write; ids of records already written are still reported.
    async fn persist(&self, report: &ExecutionReport) -> StorageReport {
        let workflow = &report.workflow;
        let mut outcome_ids = Vec::with_capacity(report.results.len());
        for result in &report.results {
            let mut metadata = json!({
                "workflow_id": workflow.workflow_id.to_string(),
                "mode": workflow.mode,
                "workflow_state": workflow.state(),
                "agent_type": result.agent_type,
                "success": result.success,
                "latency_ms": result.latency_ms,
            });
            if workflow.mode == WorkflowMode::Collaborative {
                metadata["agents_involved"] = json!(workflow.agent_ids);
            }

            let record = OutcomeRecord {
                agent_id: result.agent_id.clone(),
                command: workflow.command.text().to_string(),
                result: if result.success {
                    result.payload.clone()
                } else {
                    json!({ "error": result.error })
                },
                metadata,
                timestamp: Utc::now(),
                stored_by: self.context.config.storage.stored_by.clone(),
            };

            match self.context.store.persist(record).await {
                Ok(id) => outcome_ids.push(id),
                Err(e) => {
                    tracing::error!(
                        workflow_id = %workflow.workflow_id,
                        agent_id = %result.agent_id,
                        error = %e,
                        "Failed to persist outcome"
                    );
                    return StorageReport {
                        stored: false,
                        outcome_ids,
                    };
                }
            }
        }

        tracing::debug!(
            workflow_id = %workflow.workflow_id,
            stored = outcome_ids.len(),
            "Outcomes persisted"
        );
        StorageReport {
            stored: true,
            outcome_ids,
        }
    }

    /// Most recent outcomes of an agent, newest first
    pub async fn history(&self, agent_id: &AgentId, limit: usize) -> Result<Vec<StoredOutcome>> {
        self.context.store.history(agent_id, limit).await
    }

    /// Per-agent usage statistics
    pub async fn stats(&self) -> Result<Vec<AgentStats>> {
        self.context.store.stats().await
    }

    /// Registered agents
    pub fn agents(&self) -> Vec<AgentInfo> {
        self.context.registry.agents_info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentDescriptor, FnAgent};
    use crate::agents::{EchoAgent, MathAgent};
    use crate::config::ConductorConfig;
    use crate::registry::AgentRegistry;
    use crate::storage::OutcomeStore;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct BrokenStore;

    #[async_trait]
    impl crate::storage::OutcomeStore for BrokenStore {
        async fn persist(&self, _record: OutcomeRecord) -> Result<OutcomeId> {
            Err(Error::persistence("disk full"))
        }

        async fn history(&self, _agent_id: &AgentId, _limit: usize) -> Result<Vec<StoredOutcome>> {
            Err(Error::persistence("disk full"))
        }

        async fn stats(&self) -> Result<Vec<AgentStats>> {
            Err(Error::persistence("disk full"))
        }
    }

    /// Accepts a fixed number of writes, then fails
    struct FlakyStore {
        inner: crate::storage::InMemoryOutcomeStore,
        remaining: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl crate::storage::OutcomeStore for FlakyStore {
        async fn persist(&self, record: OutcomeRecord) -> Result<OutcomeId> {
            let left = self.remaining.load(std::sync::atomic::Ordering::SeqCst);
            if left == 0 {
                return Err(Error::persistence("connection reset"));
            }
            self.remaining.store(left - 1, std::sync::atomic::Ordering::SeqCst);
            self.inner.persist(record).await
        }

        async fn history(&self, agent_id: &AgentId, limit: usize) -> Result<Vec<StoredOutcome>> {
            self.inner.history(agent_id, limit).await
        }

        async fn stats(&self) -> Result<Vec<AgentStats>> {
            self.inner.stats().await
        }
    }

    fn text_agent(id: &str, intents: &[&str], text: &'static str) -> AgentDescriptor {
        AgentDescriptor::new(id, "document", Arc::new(FnAgent::new(move |_| async move { Ok(json!(text)) })))
            .with_intents(intents.iter().copied())
    }

    fn service() -> CommandService {
        let context = ConductorContext::in_memory();
        context.register_all([MathAgent::descriptor()]).unwrap();
        CommandService::new(context)
    }

    #[tokio::test]
    async fn test_single_response_shape() {
        let service = service();
        let response = service.handle_text("calculate 2 + 2").await;
        assert_eq!(response.http_status(), 200);

        let body = serde_json::to_value(&response).unwrap();
        assert_eq!(body["status"], "success");
        assert_eq!(body["type"], "math");
        assert_eq!(body["agent_used"], "math_agent");
        assert_eq!(body["result"]["result"], 4.0);
        assert!(body.get("collaboration_info").is_none());
        assert_eq!(body["storage"]["stored"], true);
        assert_eq!(body["storage"]["outcome_ids"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_command_is_rejected() {
        let response = service().handle_text("   ").await;
        assert_eq!(response.http_status(), 400);
        let body = serde_json::to_value(&response).unwrap();
        assert_eq!(body["status"], "error");
        assert!(body.get("status_code").is_none());
    }

    #[tokio::test]
    async fn test_no_capable_agent_without_fallback() {
        let response = service().handle_text("tell me a story").await;
        assert_eq!(response.http_status(), 503);
    }

    #[tokio::test]
    async fn test_fallback_agent_answers_unmatched_commands() {
        let mut config = ConductorConfig::default();
        config.classifier = config.classifier.with_fallback("general_agent");
        let registry = Arc::new(AgentRegistry::new());
        let store = Arc::new(crate::storage::InMemoryOutcomeStore::new());
        let context = ConductorContext::new(config, registry, store).unwrap();
        context
            .register_all([MathAgent::descriptor(), EchoAgent::descriptor()])
            .unwrap();
        let service = CommandService::new(context);

        let response = service.handle_text("tell me a story").await;
        let body = response.success().unwrap();
        assert_eq!(body.response_type, "general");
        assert_eq!(body.agent_used, Some(AgentId::new("general_agent")));
    }

    #[tokio::test]
    async fn test_failed_agent_is_bad_gateway() {
        let service = service();
        let response = service.handle_text("calculate 1 / 0").await;
        assert_eq!(response.http_status(), 502);

        let history = service.history(&AgentId::new("math_agent"), 1).await.unwrap();
        assert_eq!(history[0].metadata["workflow_state"], "failed");
        assert!(history[0].result["error"].as_str().unwrap().contains("division by zero"));
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_success() {
        let context = ConductorContext::new(
            ConductorConfig::default(),
            Arc::new(AgentRegistry::new()),
            Arc::new(BrokenStore),
        )
        .unwrap();
        context
            .register_all([AgentDescriptor::new(
                "doc_agent",
                "document",
                Arc::new(FnAgent::new(|_| async { Ok(json!("parsed")) })),
            )
            .with_intents(["pdf"])])
            .unwrap();
        let service = CommandService::new(context);

        let response = service.handle_text("read this pdf").await;
        let body = response.success().unwrap();
        assert_eq!(body.result, json!("parsed"));
        assert_eq!(body.storage, StorageReport::default());
    }

    #[tokio::test]
    async fn test_partial_persistence_reports_written_ids() {
        let store = Arc::new(FlakyStore {
            inner: crate::storage::InMemoryOutcomeStore::new(),
            remaining: std::sync::atomic::AtomicUsize::new(1),
        });
        let context = ConductorContext::new(ConductorConfig::default(), Arc::new(AgentRegistry::new()), store.clone()).unwrap();
        context
            .register_all([
                text_agent("doc_agent", &["pdf"], "pages"),
                text_agent("ocr_agent", &["image"], "glyphs"),
            ])
            .unwrap();
        let service = CommandService::new(context);

        let response = service.handle_text("extract and analyze the pdf and the image").await;
        let body = response.success().unwrap();
        assert_eq!(body.response_type, "collaborative");
        assert!(!body.storage.stored);
        assert_eq!(body.storage.outcome_ids.len(), 1);

        let written = store.inner.history(&AgentId::new("doc_agent"), 10).await.unwrap();
        assert_eq!(written[0].id, body.storage.outcome_ids[0]);
    }

    #[tokio::test]
    async fn test_panicking_agent_yields_error_response() {
        let context = ConductorContext::in_memory();
        context
            .register_all([AgentDescriptor::new(
                "doc_agent",
                "document",
                Arc::new(FnAgent::new(|_| async {
                    let payload: Option<Value> = None;
                    Ok(payload.expect("agent bug"))
                })),
            )
            .with_intents(["pdf"])])
            .unwrap();
        let service = CommandService::new(context);

        let response = service.handle_text("read the pdf").await;
        assert_eq!(response.http_status(), 502);
        let body = serde_json::to_value(&response).unwrap();
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().contains("agent task failed"));
    }

    #[tokio::test]
    async fn test_history_and_stats_after_commands() {
        let service = service();
        for expression in ["compute 1 + 1", "compute 2 + 2", "compute 3 + 3"] {
            assert!(service.handle_text(expression).await.is_success());
        }

        let history = service.history(&AgentId::new("math_agent"), 2).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].command, "compute 3 + 3");
        assert_eq!(history[0].metadata["mode"], "single");
        assert_eq!(history[0].stored_by, "conductor");

        let stats = service.stats().await.unwrap();
        assert_eq!(stats[0].total_commands, 3);
        assert_eq!(service.agents().len(), 1);
    }
}
