//! Agent registry
//!
//! Read-mostly map of capability descriptors. Writers swap in a new vector
//! (copy-on-write), so a [`RegistrySnapshot`] taken by the classifier stays
//! stable while registrations or removals happen concurrently.

use crate::agent::{AgentDescriptor, AgentInfo};
use crate::error::{Error, Result};
use crate::types::AgentId;
use parking_lot::RwLock;
use std::sync::Arc;

/// Immutable, insertion-ordered view of the registry
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    agents: Arc<Vec<Arc<AgentDescriptor>>>,
}

impl RegistrySnapshot {
    /// Descriptors in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<AgentDescriptor>> {
        self.agents.iter()
    }

    /// Look up a descriptor by id
    pub fn get(&self, agent_id: &AgentId) -> Option<&Arc<AgentDescriptor>> {
        self.agents.iter().find(|d| &d.agent_id == agent_id)
    }

    /// Position of an agent in insertion order
    pub fn position(&self, agent_id: &AgentId) -> Option<usize> {
        self.agents.iter().position(|d| &d.agent_id == agent_id)
    }

    /// Number of agents
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether the snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// Registry of capability providers
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: RwLock<Arc<Vec<Arc<AgentDescriptor>>>>,
}

impl AgentRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor; ids must be unique
    pub fn register(&self, descriptor: AgentDescriptor) -> Result<()> {
        let mut agents = self.agents.write();
        if agents.iter().any(|d| d.agent_id == descriptor.agent_id) {
            return Err(Error::DuplicateAgent(descriptor.agent_id.to_string()));
        }

        tracing::info!(
            agent_id = %descriptor.agent_id,
            agent_type = %descriptor.agent_type,
            intents = ?descriptor.intents,
            "Registered agent"
        );
        Arc::make_mut(&mut *agents).push(Arc::new(descriptor));
        Ok(())
    }

    /// Revoke a descriptor at runtime
    pub fn remove(&self, agent_id: &AgentId) -> Result<Arc<AgentDescriptor>> {
        let mut agents = self.agents.write();
        let index = agents
            .iter()
            .position(|d| &d.agent_id == agent_id)
            .ok_or_else(|| Error::unknown_agent(agent_id.as_str()))?;

        tracing::info!(agent_id = %agent_id, "Removed agent");
        Ok(Arc::make_mut(&mut *agents).remove(index))
    }

    /// Look up a descriptor by id
    pub fn lookup(&self, agent_id: &AgentId) -> Result<Arc<AgentDescriptor>> {
        self.agents
            .read()
            .iter()
            .find(|d| &d.agent_id == agent_id)
            .cloned()
            .ok_or_else(|| Error::unknown_agent(agent_id.as_str()))
    }

    /// Descriptors supporting the intent tag, in insertion order
    pub fn query(&self, intent: &str) -> Vec<Arc<AgentDescriptor>> {
        self.agents
            .read()
            .iter()
            .filter(|d| d.supports(intent))
            .cloned()
            .collect()
    }

    /// Current contents as an immutable snapshot
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            agents: Arc::clone(&self.agents.read()),
        }
    }

    /// Listing of every registered agent
    pub fn agents_info(&self) -> Vec<AgentInfo> {
        self.agents.read().iter().map(|d| d.info()).collect()
    }

    /// Whether an agent is registered
    pub fn contains(&self, agent_id: &AgentId) -> bool {
        self.agents.read().iter().any(|d| &d.agent_id == agent_id)
    }

    /// Number of registered agents
    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }
}
