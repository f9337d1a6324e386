//! Echo agent, the usual fallback for unmatched commands

use crate::agent::{Agent, AgentDescriptor};
use crate::error::Result;
use crate::types::Command;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// Returns the command text unchanged
pub struct EchoAgent;

impl EchoAgent {
    /// Descriptor registered as `general_agent`, type `general`
    pub fn descriptor() -> AgentDescriptor {
        AgentDescriptor::new("general_agent", "general", Arc::new(EchoAgent))
            .with_intents(["help", "hello", "general"])
    }
}

#[async_trait]
impl Agent for EchoAgent {
    async fn invoke(&self, command: &Command) -> Result<Value> {
        Ok(json!({
            "message": format!("Echo: {}", command.text()),
            "received_at": command.received_at(),
        }))
    }
}
