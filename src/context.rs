//! Process-wide handles built once at startup

use crate::agent::AgentDescriptor;
use crate::config::ConductorConfig;
use crate::error::Result;
use crate::registry::AgentRegistry;
use crate::storage::{open_store, InMemoryOutcomeStore, OutcomeStore};
use std::sync::Arc;

/// Registry, store and configuration shared by the classifier, executor and service
#[derive(Clone)]
pub struct ConductorContext {
    /// Agent registry
    pub registry: Arc<AgentRegistry>,
    /// Outcome store
    pub store: Arc<dyn OutcomeStore>,
    /// Validated configuration
    pub config: Arc<ConductorConfig>,
}

impl ConductorContext {
    /// Assemble a context from existing parts
    pub fn new(
        config: ConductorConfig,
        registry: Arc<AgentRegistry>,
        store: Arc<dyn OutcomeStore>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry,
            store,
            config: Arc::new(config),
        })
    }

    /// Validate the configuration and open the configured store, with an empty registry
    pub async fn from_config(config: ConductorConfig) -> Result<Self> {
        let store = open_store(&config.storage).await?;
        tracing::info!(backend = ?config.storage.backend, "Outcome store ready");
        Self::new(config, Arc::new(AgentRegistry::new()), store)
    }

    /// In-memory store and default configuration
    pub fn in_memory() -> Self {
        Self {
            registry: Arc::new(AgentRegistry::new()),
            store: Arc::new(InMemoryOutcomeStore::new()),
            config: Arc::new(ConductorConfig::default()),
        }
    }

    /// Register several agents, stopping at the first duplicate
    pub fn register_all(&self, descriptors: impl IntoIterator<Item = AgentDescriptor>) -> Result<()> {
        for descriptor in descriptors {
            self.registry.register(descriptor)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{EchoAgent, MathAgent};
    use crate::error::Error;

    #[tokio::test]
    async fn test_from_config_opens_memory_store() {
        let context = ConductorContext::from_config(ConductorConfig::default()).await.unwrap();
        assert!(context.registry.is_empty());
        assert!(context.store.stats().await.unwrap().is_empty());
    }

    #[test]
    fn test_register_all_rejects_duplicates() {
        let context = ConductorContext::in_memory();
        context
            .register_all([MathAgent::descriptor(), EchoAgent::descriptor()])
            .unwrap();
        let err = context.register_all([MathAgent::descriptor()]).unwrap_err();
        assert!(matches!(err, Error::DuplicateAgent(_)));
        assert_eq!(context.registry.len(), 2);
    }
}
