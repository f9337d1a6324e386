//! Outcome store adapters
//!
//! This module provides:
//! - `OutcomeStore` trait: append-only persistence plus history/stats queries
//! - In-memory backend for tests and ephemeral deployments
//! - sled backend for embedded local persistence
//! - SQLite backend (feature `storage`) with automatic migrations

use crate::config::{StorageBackend, StorageConfig};
use crate::error::{Error, Result};
use crate::types::{AgentId, OutcomeId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A record about to be persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecord {
    /// Agent the record belongs to
    pub agent_id: AgentId,
    /// Command text
    pub command: String,
    /// Result payload (or error description)
    pub result: Value,
    /// Workflow metadata
    pub metadata: Value,
    /// When the outcome was produced
    pub timestamp: DateTime<Utc>,
    /// Component that wrote the record
    pub stored_by: String,
}

/// A persisted, immutable outcome document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOutcome {
    /// Store-generated identifier
    pub id: OutcomeId,
    /// Agent the record belongs to
    pub agent_id: AgentId,
    /// Command text
    pub command: String,
    /// Result payload
    pub result: Value,
    /// Workflow metadata
    pub metadata: Value,
    /// When the outcome was produced
    pub timestamp: DateTime<Utc>,
    /// Component that wrote the record
    pub stored_by: String,
}

impl StoredOutcome {
    fn from_record(id: OutcomeId, record: OutcomeRecord) -> Self {
        Self {
            id,
            agent_id: record.agent_id,
            command: record.command,
            result: record.result,
            metadata: record.metadata,
            timestamp: record.timestamp,
            stored_by: record.stored_by,
        }
    }
}

/// Usage statistics for one agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStats {
    /// Agent identifier
    pub agent_id: AgentId,
    /// Number of persisted outcomes
    pub total_commands: u64,
    /// Most recent outcome timestamp
    pub last_used: DateTime<Utc>,
}

/// Append-only outcome persistence
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    /// Append a record and return its identifier
    async fn persist(&self, record: OutcomeRecord) -> Result<OutcomeId>;

    /// Most recent `limit` records of an agent, newest first
    async fn history(&self, agent_id: &AgentId, limit: usize) -> Result<Vec<StoredOutcome>>;

    /// Per-agent counts and last-used timestamps, sorted by agent id
    async fn stats(&self) -> Result<Vec<AgentStats>>;
}

/// Open the backend selected by the configuration
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn OutcomeStore>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(InMemoryOutcomeStore::new())),
        StorageBackend::Sled => {
            let path = config
                .path
                .as_ref()
                .ok_or_else(|| Error::config("storage.path is required for the sled backend"))?;
            Ok(Arc::new(SledOutcomeStore::open(path)?))
        }
        #[cfg(feature = "storage")]
        StorageBackend::Sqlite => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| Error::config("storage.database_url is required for the sqlite backend"))?;
            Ok(Arc::new(SqliteOutcomeStore::new(url).await?))
        }
        #[cfg(not(feature = "storage"))]
        StorageBackend::Sqlite => Err(Error::config(
            "the sqlite backend requires the `storage` feature",
        )),
    }
}

/// Sort newest first; later insertions win timestamp ties
fn newest_first(entries: &mut [(u64, StoredOutcome)]) {
    entries.sort_by(|(seq_a, a), (seq_b, b)| {
        b.timestamp.cmp(&a.timestamp).then(seq_b.cmp(seq_a))
    });
}

/// Process-local store
#[derive(Debug, Default)]
pub struct InMemoryOutcomeStore {
    outcomes: DashMap<AgentId, Vec<(u64, StoredOutcome)>>,
    sequence: AtomicU64,
}

impl InMemoryOutcomeStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Total records across all agents
    pub fn len(&self) -> usize {
        self.outcomes.iter().map(|entry| entry.value().len()).sum()
    }

    /// Whether nothing has been stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl OutcomeStore for InMemoryOutcomeStore {
    async fn persist(&self, record: OutcomeRecord) -> Result<OutcomeId> {
        let id = OutcomeId::generate();
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let stored = StoredOutcome::from_record(id.clone(), record);
        self.outcomes
            .entry(stored.agent_id.clone())
            .or_default()
            .push((seq, stored));
        Ok(id)
    }

    async fn history(&self, agent_id: &AgentId, limit: usize) -> Result<Vec<StoredOutcome>> {
        let mut entries = self
            .outcomes
            .get(agent_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        newest_first(&mut entries);
        Ok(entries.into_iter().take(limit).map(|(_, outcome)| outcome).collect())
    }

    async fn stats(&self) -> Result<Vec<AgentStats>> {
        let mut stats: Vec<AgentStats> = self
            .outcomes
            .iter()
            .filter_map(|entry| {
                let last_used = entry.value().iter().map(|(_, o)| o.timestamp).max()?;
                Some(AgentStats {
                    agent_id: entry.key().clone(),
                    total_commands: entry.value().len() as u64,
                    last_used,
                })
            })
            .collect();
        stats.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        Ok(stats)
    }
}

/// Embedded sled store
///
/// Keys are `agent_id 0x00 timestamp_micros sequence`, so a reverse prefix
/// scan yields an agent's history newest first.
pub struct SledOutcomeStore {
    db: sled::Db,
    outcomes: sled::Tree,
}

impl SledOutcomeStore {
    /// Open (or create) a database directory
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Throwaway database removed on drop
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let outcomes = db.open_tree("outcomes")?;
        Ok(Self { db, outcomes })
    }

    fn prefix(agent_id: &AgentId) -> Vec<u8> {
        let mut prefix = agent_id.as_str().as_bytes().to_vec();
        prefix.push(0);
        prefix
    }

    fn key(agent_id: &AgentId, timestamp: DateTime<Utc>, seq: u64) -> Vec<u8> {
        let mut key = Self::prefix(agent_id);
        // Flip the sign bit so negative timestamps still sort before positive ones
        let micros = (timestamp.timestamp_micros() as u64) ^ (1 << 63);
        key.extend_from_slice(&micros.to_be_bytes());
        key.extend_from_slice(&seq.to_be_bytes());
        key
    }
}

#[async_trait]
impl OutcomeStore for SledOutcomeStore {
    async fn persist(&self, record: OutcomeRecord) -> Result<OutcomeId> {
        let id = OutcomeId::generate();
        let seq = self.db.generate_id()?;
        let key = Self::key(&record.agent_id, record.timestamp, seq);
        let stored = StoredOutcome::from_record(id.clone(), record);

        self.outcomes.insert(key, serde_json::to_vec(&stored)?)?;
        self.outcomes.flush_async().await?;
        Ok(id)
    }

    async fn history(&self, agent_id: &AgentId, limit: usize) -> Result<Vec<StoredOutcome>> {
        self.outcomes
            .scan_prefix(Self::prefix(agent_id))
            .rev()
            .take(limit)
            .map(|entry| {
                let (_, value) = entry?;
                Ok(serde_json::from_slice(&value)?)
            })
            .collect()
    }

    async fn stats(&self) -> Result<Vec<AgentStats>> {
        let mut by_agent: BTreeMap<AgentId, AgentStats> = BTreeMap::new();
        for entry in self.outcomes.iter() {
            let (_, value) = entry?;
            let outcome: StoredOutcome = serde_json::from_slice(&value)?;
            by_agent
                .entry(outcome.agent_id.clone())
                .and_modify(|s| {
                    s.total_commands += 1;
                    s.last_used = s.last_used.max(outcome.timestamp);
                })
                .or_insert(AgentStats {
                    agent_id: outcome.agent_id,
                    total_commands: 1,
                    last_used: outcome.timestamp,
                });
        }
        Ok(by_agent.into_values().collect())
    }
}

#[cfg(feature = "storage")]
pub use self::sqlite::SqliteOutcomeStore;

#[cfg(feature = "storage")]
mod sqlite {
    use super::*;
    use chrono::SecondsFormat;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use sqlx::{Pool, Row, Sqlite};
    use std::str::FromStr;

    /// SQLite storage backend
    pub struct SqliteOutcomeStore {
        pool: Pool<Sqlite>,
    }

    impl SqliteOutcomeStore {
        /// Connect and run migrations
        pub async fn new(database_url: &str) -> Result<Self> {
            let options = SqliteConnectOptions::from_str(database_url)
                .map_err(|e| Error::config(format!("Invalid SQLite URL: {}", e)))?
                .create_if_missing(true);

            // Every connection to an in-memory database sees its own database
            let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
            let pool = SqlitePoolOptions::new()
                .max_connections(max_connections)
                .connect_with(options)
                .await
                .map_err(|e| Error::persistence(format!("Failed to connect to SQLite: {}", e)))?;

            let storage = Self { pool };
            storage.run_migrations().await?;
            Ok(storage)
        }

        async fn run_migrations(&self) -> Result<()> {
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS outcomes (
                    id TEXT PRIMARY KEY,
                    agent_id TEXT NOT NULL,
                    command TEXT NOT NULL,
                    result TEXT NOT NULL,
                    metadata TEXT NOT NULL,
                    timestamp TEXT NOT NULL,
                    stored_by TEXT NOT NULL
                )
                "#,
            )
            .execute(&self.pool)
            .await
            .map_err(|e| Error::persistence(format!("Failed to create outcomes table: {}", e)))?;

            sqlx::query(
                "CREATE INDEX IF NOT EXISTS idx_outcomes_agent_time ON outcomes(agent_id, timestamp)",
            )
            .execute(&self.pool)
            .await
            .map_err(|e| Error::persistence(format!("Failed to create index: {}", e)))?;

            Ok(())
        }

        fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
            Ok(DateTime::parse_from_rfc3339(raw)
                .map_err(|e| Error::persistence(format!("Invalid timestamp: {}", e)))?
                .with_timezone(&Utc))
        }
    }

    /// Fixed-width RFC 3339 so lexical order equals time order
    fn format_timestamp(timestamp: DateTime<Utc>) -> String {
        timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    #[async_trait]
    impl OutcomeStore for SqliteOutcomeStore {
        async fn persist(&self, record: OutcomeRecord) -> Result<OutcomeId> {
            let id = OutcomeId::generate();
            sqlx::query(
                r#"
                INSERT INTO outcomes
                (id, agent_id, command, result, metadata, timestamp, stored_by)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id.as_str())
            .bind(record.agent_id.as_str())
            .bind(&record.command)
            .bind(serde_json::to_string(&record.result)?)
            .bind(serde_json::to_string(&record.metadata)?)
            .bind(format_timestamp(record.timestamp))
            .bind(&record.stored_by)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::persistence(format!("Failed to save outcome: {}", e)))?;

            Ok(id)
        }

        async fn history(&self, agent_id: &AgentId, limit: usize) -> Result<Vec<StoredOutcome>> {
            let rows = sqlx::query(
                r#"
                SELECT id, agent_id, command, result, metadata, timestamp, stored_by
                FROM outcomes WHERE agent_id = ?
                ORDER BY timestamp DESC, rowid DESC
                LIMIT ?
                "#,
            )
            .bind(agent_id.as_str())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::persistence(format!("Failed to load history: {}", e)))?;

            let mut outcomes = Vec::with_capacity(rows.len());
            for row in rows {
                let id: String = row.get(0);
                let agent: String = row.get(1);
                let result_json: String = row.get(3);
                let metadata_json: String = row.get(4);
                let timestamp: String = row.get(5);

                outcomes.push(StoredOutcome {
                    id: OutcomeId::new(id),
                    agent_id: AgentId::new(agent),
                    command: row.get(2),
                    result: serde_json::from_str(&result_json)?,
                    metadata: serde_json::from_str(&metadata_json)?,
                    timestamp: Self::parse_timestamp(&timestamp)?,
                    stored_by: row.get(6),
                });
            }
            Ok(outcomes)
        }

        async fn stats(&self) -> Result<Vec<AgentStats>> {
            let rows = sqlx::query(
                r#"
                SELECT agent_id, COUNT(*), MAX(timestamp)
                FROM outcomes
                GROUP BY agent_id
                ORDER BY agent_id
                "#,
            )
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::persistence(format!("Failed to aggregate stats: {}", e)))?;

            rows.into_iter()
                .map(|row| {
                    let agent: String = row.get(0);
                    let total: i64 = row.get(1);
                    let last_used: String = row.get(2);
                    Ok(AgentStats {
                        agent_id: AgentId::new(agent),
                        total_commands: total as u64,
                        last_used: Self::parse_timestamp(&last_used)?,
                    })
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn record(agent: &str, minute: u32) -> OutcomeRecord {
        OutcomeRecord {
            agent_id: AgentId::new(agent),
            command: format!("command at {minute}"),
            result: json!({ "minute": minute }),
            metadata: json!({ "mode": "single" }),
            timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 12, minute, 0).unwrap(),
            stored_by: "test".to_string(),
        }
    }

    async fn assert_history_contract(store: &dyn OutcomeStore) {
        for minute in [3, 1, 4, 0, 2] {
            store.persist(record("ocr_agent", minute)).await.unwrap();
        }
        store.persist(record("pdf_agent", 9)).await.unwrap();

        let history = store.history(&AgentId::new("ocr_agent"), 3).await.unwrap();
        assert_eq!(history.len(), 3);
        let minutes: Vec<_> = history.iter().map(|o| o.result["minute"].as_u64().unwrap()).collect();
        assert_eq!(minutes, vec![4, 3, 2]);
        assert!(history.windows(2).all(|w| w[0].timestamp > w[1].timestamp));
        assert!(history.iter().all(|o| o.agent_id == AgentId::new("ocr_agent")));
    }

    async fn assert_stats_contract(store: &dyn OutcomeStore) {
        for minute in 0..4 {
            store.persist(record("alpha", minute)).await.unwrap();
        }
        for minute in [10, 30] {
            store.persist(record("beta", minute)).await.unwrap();
        }

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].agent_id, AgentId::new("alpha"));
        assert_eq!(stats[0].total_commands, 4);
        assert_eq!(stats[0].last_used, Utc.with_ymd_and_hms(2025, 3, 1, 12, 3, 0).unwrap());
        assert_eq!(stats[1].total_commands, 2);
        assert_eq!(stats[1].last_used, Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap());
    }

    #[tokio::test]
    async fn test_memory_history_and_stats() {
        assert_history_contract(&InMemoryOutcomeStore::new()).await;
        assert_stats_contract(&InMemoryOutcomeStore::new()).await;
    }

    #[tokio::test]
    async fn test_memory_timestamp_ties_newest_insert_first() {
        let store = InMemoryOutcomeStore::new();
        let mut first = record("a", 5);
        first.command = "first".into();
        let mut second = record("a", 5);
        second.command = "second".into();
        store.persist(first).await.unwrap();
        store.persist(second).await.unwrap();

        let history = store.history(&AgentId::new("a"), 10).await.unwrap();
        assert_eq!(history[0].command, "second");
    }

    #[tokio::test]
    async fn test_memory_concurrent_persist() {
        let store = Arc::new(InMemoryOutcomeStore::new());
        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    let mut r = record(if i % 2 == 0 { "even" } else { "odd" }, 0);
                    r.timestamp += Duration::seconds(i);
                    store.persist(r).await.unwrap()
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(store.len(), 32);
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.iter().map(|s| s.total_commands).sum::<u64>(), 32);
    }

    #[tokio::test]
    async fn test_sled_history_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledOutcomeStore::open(dir.path().join("history")).unwrap();
        assert_history_contract(&store).await;

        let stats_store = SledOutcomeStore::temporary().unwrap();
        assert_stats_contract(&stats_store).await;
    }

    #[tokio::test]
    async fn test_sled_prefix_does_not_leak_between_agents() {
        let store = SledOutcomeStore::temporary().unwrap();
        store.persist(record("ocr", 1)).await.unwrap();
        store.persist(record("ocr_agent", 2)).await.unwrap();

        let history = store.history(&AgentId::new("ocr"), 10).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_open_store_requires_sled_path() {
        let config = StorageConfig {
            backend: StorageBackend::Sled,
            ..StorageConfig::default()
        };
        assert!(matches!(open_store(&config).await, Err(Error::Config(_))));
    }

    #[cfg(feature = "storage")]
    #[tokio::test]
    async fn test_sqlite_history_and_stats() {
        let store = SqliteOutcomeStore::new("sqlite::memory:")
            .await
            .expect("Failed to create SQLite storage");
        assert_history_contract(&store).await;

        let stats_store = SqliteOutcomeStore::new("sqlite::memory:").await.unwrap();
        assert_stats_contract(&stats_store).await;
    }

    #[cfg(feature = "storage")]
    #[tokio::test]
    async fn test_sqlite_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("outcomes.db").display());
        let store = SqliteOutcomeStore::new(&url).await.unwrap();

        let id = store.persist(record("pdf_agent", 7)).await.unwrap();
        let history = store.history(&AgentId::new("pdf_agent"), 1).await.unwrap();
        assert_eq!(history[0].id, id);
        assert_eq!(history[0].metadata["mode"], "single");
    }
}
