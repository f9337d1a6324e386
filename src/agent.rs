//! Agent capability interface and registry descriptors
//!
//! Every capability provider (document extraction, OCR, LLM Q&A, remote HTTP
//! services, the arithmetic adapter) sits behind the same [`Agent`] trait. The
//! orchestration core only ever sees an [`AgentDescriptor`].

use crate::error::Result;
use crate::types::{AgentId, Command};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Uniform invocation interface for capability providers
#[async_trait]
pub trait Agent: Send + Sync {
    /// Process a command and return an opaque JSON payload
    async fn invoke(&self, command: &Command) -> Result<Value>;
}

/// A registered capability provider
#[derive(Clone)]
pub struct AgentDescriptor {
    /// Unique agent identifier
    pub agent_id: AgentId,
    /// Type label reported to callers (e.g. "math", "document")
    pub agent_type: String,
    /// Lowercased intent tags this agent supports
    pub intents: Vec<String>,
    /// Higher wins when several agents weakly match
    pub priority: i32,
    handle: Arc<dyn Agent>,
}

impl AgentDescriptor {
    /// Create a descriptor with no intents and priority 0
    pub fn new(
        agent_id: impl Into<AgentId>,
        agent_type: impl Into<String>,
        handle: Arc<dyn Agent>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_type: agent_type.into(),
            intents: Vec::new(),
            priority: 0,
            handle,
        }
    }

    /// Add intent tags; tags are lowercased and deduplicated
    pub fn with_intents<I, S>(mut self, intents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for intent in intents {
            let tag = intent.as_ref().trim().to_lowercase();
            if !tag.is_empty() && !self.intents.contains(&tag) {
                self.intents.push(tag);
            }
        }
        self
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Whether the agent declares the given intent tag
    pub fn supports(&self, intent: &str) -> bool {
        let intent = intent.to_lowercase();
        self.intents.iter().any(|tag| *tag == intent)
    }

    /// Invocation handle
    pub fn handle(&self) -> Arc<dyn Agent> {
        Arc::clone(&self.handle)
    }

    /// Serializable summary without the handle
    pub fn info(&self) -> AgentInfo {
        AgentInfo {
            agent_id: self.agent_id.clone(),
            agent_type: self.agent_type.clone(),
            intents: self.intents.clone(),
            priority: self.priority,
        }
    }
}

impl fmt::Debug for AgentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentDescriptor")
            .field("agent_id", &self.agent_id)
            .field("agent_type", &self.agent_type)
            .field("intents", &self.intents)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Listing entry for a registered agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    /// Agent identifier
    pub agent_id: AgentId,
    /// Agent type
    pub agent_type: String,
    /// Supported intents
    pub intents: Vec<String>,
    /// Priority
    pub priority: i32,
}

type AgentFn = dyn Fn(Command) -> BoxFuture<'static, Result<Value>> + Send + Sync;

/// Agent backed by an async closure
pub struct FnAgent {
    func: Box<AgentFn>,
}

impl FnAgent {
    /// Wrap a closure taking an owned command
    pub fn new<F, Fut>(func: F) -> Self
    where
        F: Fn(Command) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            func: Box::new(move |command| Box::pin(func(command))),
        }
    }
}

#[async_trait]
impl Agent for FnAgent {
    async fn invoke(&self, command: &Command) -> Result<Value> {
        (self.func)(command.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_agent_invocation() {
        let agent = FnAgent::new(|cmd: Command| async move { Ok(json!({ "echo": cmd.text() })) });
        let command = Command::new("hello").unwrap();
        let payload = agent.invoke(&command).await.unwrap();
        assert_eq!(payload["echo"], "hello");
    }

    #[test]
    fn test_intents_are_normalized() {
        let descriptor = AgentDescriptor::new(
            "doc",
            "document",
            Arc::new(FnAgent::new(|_| async { Ok(Value::Null) })),
        )
        .with_intents(["PDF", "pdf", " Extract Text ", ""]);

        assert_eq!(descriptor.intents, vec!["pdf", "extract text"]);
        assert!(descriptor.supports("Pdf"));
        assert!(!descriptor.supports("ocr"));
    }
}
