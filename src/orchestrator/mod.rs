//! Orchestrator module - workflow execution and result synthesis
//!
//! # Flow
//!
//! - **Executor**: runs a classified workflow, one agent or a concurrent
//!   fan-out with per-agent and per-workflow timeouts
//! - **Synthesizer**: merges collaborative outputs in dispatch order
//!
//! # Example
//!
//! ```rust,ignore
//! use conductor::orchestrator::WorkflowExecutor;
//!
//! let executor = WorkflowExecutor::new(registry, config.executor.clone());
//! let report = executor.execute(classification.workflow).await;
//! ```

pub mod executor;
pub mod report;
pub mod synthesizer;

// Re-exports
pub use executor::WorkflowExecutor;
pub use report::{ExecutionReport, WorkflowOutput};
pub use synthesizer::{
    payload_text,
    AgentContribution,
    ResultSynthesizer,
    SynthesisStrategy,
    SynthesizedResult,
};
