//! # Conductor
//!
//! Command orchestration layer for multi-agent systems built with Rust.
//!
//! A free-text command is classified against a registry of capability agents,
//! dispatched to one agent or fanned out to several, and the collaborative
//! outputs are synthesized into a single answer. Every dispatched invocation is
//! recorded in an outcome store.
//!
//! ## Features
//!
//! - **Lexical Classification**: intent tags, breadth signals, priority tie-breaks
//! - **Concurrent Collaboration**: one task per agent, bounded by timeouts
//! - **Degraded Results**: partial failures still yield an answer
//! - **Pluggable Storage**: in-memory, sled or SQLite outcome stores
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use conductor::agents::{EchoAgent, MathAgent};
//! use conductor::{CommandService, ConductorContext};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let context = ConductorContext::in_memory();
//!     context.register_all([MathAgent::descriptor(), EchoAgent::descriptor()])?;
//!
//!     let service = CommandService::new(context);
//!     let response = service.handle_text("calculate 15% of 200").await;
//!     println!("{}", serde_json::to_string_pretty(&response)?);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod agent;
pub mod agents;
pub mod classifier;
pub mod config;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod service;
pub mod storage;
pub mod telemetry;
pub mod types;
pub mod workflow;

// Re-exports for convenience
pub use agent::{Agent, AgentDescriptor, AgentInfo, FnAgent};
pub use classifier::{BreadthSignal, Classification, CommandClassifier};
pub use config::{ClassifierConfig, ConductorConfig, ExecutorConfig, StorageBackend, StorageConfig};
pub use context::ConductorContext;
pub use error::{Error, Result};
pub use orchestrator::{ExecutionReport, ResultSynthesizer, SynthesizedResult, WorkflowExecutor};
pub use registry::AgentRegistry;
pub use service::{CommandRequest, CommandResponse, CommandService};
pub use storage::{AgentStats, InMemoryOutcomeStore, OutcomeRecord, OutcomeStore, StoredOutcome};
pub use types::{AgentId, Command, OutcomeId, WorkflowId};
pub use workflow::{AgentInvocationResult, Workflow, WorkflowMode, WorkflowState};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::agent::{Agent, AgentDescriptor, FnAgent};
    pub use crate::context::ConductorContext;
    pub use crate::error::{Error, Result};
    pub use crate::service::{CommandRequest, CommandResponse, CommandService};
    pub use crate::storage::OutcomeStore;
    pub use crate::types::*;
}
