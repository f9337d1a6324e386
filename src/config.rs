//! Configuration types for the orchestration layer
//!
//! Configuration is layered: built-in defaults, then an optional YAML file,
//! then `CONDUCTOR__*` environment variables (e.g.
//! `CONDUCTOR__EXECUTOR__AGENT_TIMEOUT_MS=5000`).

use crate::error::{Error, Result};
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorConfig {
    /// Command classification policy
    pub classifier: ClassifierConfig,
    /// Workflow execution limits
    pub executor: ExecutorConfig,
    /// Outcome store selection
    pub storage: StorageConfig,
    /// Logging setup
    pub telemetry: TelemetryConfig,
}

impl ConductorConfig {
    /// Load configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("Failed to parse YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Load defaults, an optional YAML file and `CONDUCTOR__*` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // Load .env if present so local development picks up CONDUCTOR__ overrides
        let _ = dotenv();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            let path = path
                .to_str()
                .ok_or_else(|| Error::config(format!("Non UTF-8 config path: {}", path.display())))?;
            builder = builder.add_source(config::File::new(path, config::FileFormat::Yaml));
        }
        let config: Self = builder
            .add_source(
                config::Environment::with_prefix("CONDUCTOR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the executor and classifier cannot honor
    pub fn validate(&self) -> Result<()> {
        let exec = &self.executor;
        if exec.agent_timeout_ms == 0 || exec.workflow_timeout_ms == 0 {
            return Err(Error::config("timeouts must be greater than zero"));
        }
        if exec.agent_timeout_ms > exec.workflow_timeout_ms {
            return Err(Error::config(format!(
                "agent_timeout_ms ({}) exceeds workflow_timeout_ms ({})",
                exec.agent_timeout_ms, exec.workflow_timeout_ms
            )));
        }
        if self.classifier.max_collaborators < 2 {
            return Err(Error::config("max_collaborators must be at least 2"));
        }
        Ok(())
    }
}

/// Thresholds for the single vs. collaborative decision
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Agent used when no intent tag matches
    pub fallback_agent: Option<String>,
    /// Matched agents holding an exclusive tag needed to count as breadth
    pub min_independent_agents: usize,
    /// Distinct breadth keyword categories needed to count as breadth
    pub min_breadth_categories: usize,
    /// Token count at which a command is treated as compound
    pub min_compound_tokens: usize,
    /// Upper bound on agents dispatched by one collaborative workflow
    pub max_collaborators: usize,
    /// Breadth keyword categories
    pub breadth_categories: BTreeMap<String, Vec<String>>,
    /// Explicit multi-topic phrases
    pub breadth_phrases: Vec<String>,
}

impl ClassifierConfig {
    /// Set the fallback agent
    pub fn with_fallback(mut self, agent_id: impl Into<String>) -> Self {
        self.fallback_agent = Some(agent_id.into());
        self
    }

    /// Set the compound token threshold
    pub fn with_min_compound_tokens(mut self, tokens: usize) -> Self {
        self.min_compound_tokens = tokens;
        self
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        let categories: [(&str, &[&str]); 7] = [
            ("comprehensive", &["comprehensive", "complete", "thorough", "detailed", "full"]),
            ("analysis", &["analyze", "analysis", "examine", "study", "investigate"]),
            ("research", &["research", "find", "gather", "collect"]),
            ("compare", &["compare", "contrast", "versus", "vs", "difference"]),
            ("create", &["create", "generate", "build", "make", "produce"]),
            ("process", &["process", "transform", "convert", "handle"]),
            ("multiple", &["multiple", "several", "various", "different", "many"]),
        ];

        Self {
            fallback_agent: None,
            min_independent_agents: 3,
            min_breadth_categories: 2,
            min_compound_tokens: 40,
            max_collaborators: 5,
            breadth_categories: categories
                .iter()
                .map(|(name, words)| {
                    (name.to_string(), words.iter().map(|w| w.to_string()).collect())
                })
                .collect(),
            breadth_phrases: [
                "step by step",
                "comprehensive analysis",
                "detailed report",
                "research and analyze",
                "process and summarize",
                "extract and analyze",
                "as well as",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
        }
    }
}

/// Workflow execution limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Upper bound for a single agent invocation
    pub agent_timeout_ms: u64,
    /// Upper bound for the whole dispatch/aggregation span
    pub workflow_timeout_ms: u64,
}

impl ExecutorConfig {
    /// Per-agent timeout
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_millis(self.agent_timeout_ms)
    }

    /// Overall workflow timeout
    pub fn workflow_timeout(&self) -> Duration {
        Duration::from_millis(self.workflow_timeout_ms)
    }

    /// Set both timeouts
    pub fn with_timeouts(mut self, agent: Duration, workflow: Duration) -> Self {
        self.agent_timeout_ms = agent.as_millis() as u64;
        self.workflow_timeout_ms = workflow.as_millis() as u64;
        self
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            agent_timeout_ms: 30_000,
            workflow_timeout_ms: 60_000,
        }
    }
}

/// Supported outcome store backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Process-local, lost on restart
    #[default]
    Memory,
    /// Embedded sled database at `path`
    Sled,
    /// SQLite database at `database_url`
    Sqlite,
}

/// Outcome store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Which backend to open
    pub backend: StorageBackend,
    /// Directory for the sled backend
    pub path: Option<PathBuf>,
    /// Connection URL for the SQLite backend
    pub database_url: Option<String>,
    /// Value written into the `stored_by` field of every record
    pub stored_by: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: None,
            database_url: None,
            stored_by: "conductor".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
