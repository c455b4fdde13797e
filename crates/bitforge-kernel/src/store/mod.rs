//! Stores for buffers, scripts, strategies, and persisted results.
//!
//! Every store is an explicit object constructed once and injected into the
//! engine and the job manager — there are no global registries. Buffer and
//! result persistence sits behind `async` traits so an embedder can swap in
//! a durable repository; the in-memory implementations in [`memory`] are
//! the default.

mod memory;

pub use memory::{MemoryFileStore, MemoryResultsStore};

use std::collections::HashMap;

use async_trait::async_trait;
use bitforge_types::{
    BitBuffer, BufferId, BufferKind, ExecutionPipelineResult, FileHandle, ResultId, ResultRecord,
    StrategyConfig,
};
use thiserror::Error;
use tokio::sync::RwLock;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Store operation errors.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("buffer not found: {0}")]
    BufferNotFound(BufferId),
    #[error("result not found: {0}")]
    ResultNotFound(ResultId),
    #[error("script not found: {0}")]
    ScriptNotFound(String),
    #[error("strategy not found: {0}")]
    StrategyNotFound(String),
}

/// A stored buffer: its handle plus the bits themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferRecord {
    pub handle: FileHandle,
    pub bits: BitBuffer,
}

/// Storage for named bit buffers.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Store a buffer and return its handle.
    async fn create_file(&self, name: &str, bits: BitBuffer, kind: BufferKind) -> FileHandle;

    /// Fetch a stored buffer.
    async fn get_file(&self, id: BufferId) -> StoreResult<BufferRecord>;

    /// Remove a stored buffer.
    async fn delete_file(&self, id: BufferId) -> StoreResult<()>;
}

/// Persistence for pipeline result records.
#[async_trait]
pub trait ResultsStore: Send + Sync {
    /// Persist a pipeline result, assigning it an id.
    async fn create_result(&self, result: ExecutionPipelineResult) -> ResultRecord;

    /// Fetch a persisted record.
    async fn get_result(&self, id: ResultId) -> StoreResult<ResultRecord>;

    /// All persisted records, in creation order.
    async fn list_results(&self) -> Vec<ResultRecord>;
}

/// Registry of stage script sources, keyed by file name.
///
/// Stage files are plain text scripts; the bridge is injected under a fixed
/// module name (`bridge`) before execution.
#[derive(Debug, Default)]
pub struct ScriptStore {
    scripts: RwLock<HashMap<String, String>>,
}

impl ScriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a script.
    pub async fn put(&self, name: impl Into<String>, source: impl Into<String>) {
        self.scripts.write().await.insert(name.into(), source.into());
    }

    /// Fetch a script's source text.
    pub async fn get(&self, name: &str) -> StoreResult<String> {
        self.scripts
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::ScriptNotFound(name.to_string()))
    }

    /// True if a script with this name is registered.
    pub async fn contains(&self, name: &str) -> bool {
        self.scripts.read().await.contains_key(name)
    }
}

/// Registry of strategy configurations.
#[derive(Debug, Default)]
pub struct StrategyStore {
    strategies: RwLock<HashMap<String, StrategyConfig>>,
}

impl StrategyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a strategy.
    pub async fn register(&self, strategy: StrategyConfig) {
        self.strategies.write().await.insert(strategy.id.clone(), strategy);
    }

    /// Fetch a strategy by id.
    pub async fn get(&self, id: &str) -> StoreResult<StrategyConfig> {
        self.strategies
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::StrategyNotFound(id.to_string()))
    }

    /// True if a strategy with this id is registered.
    pub async fn contains(&self, id: &str) -> bool {
        self.strategies.read().await.contains_key(id)
    }

    /// All registered strategies, in no particular order.
    pub async fn list(&self) -> Vec<StrategyConfig> {
        self.strategies.read().await.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn script_store_round_trip() {
        let store = ScriptStore::new();
        store.put("sched", "log(\"hello\")").await;
        assert!(store.contains("sched").await);
        assert_eq!(store.get("sched").await.unwrap(), "log(\"hello\")");
        assert!(matches!(store.get("missing").await, Err(StoreError::ScriptNotFound(_))));
    }

    #[tokio::test]
    async fn strategy_store_round_trip() {
        let store = StrategyStore::new();
        store.register(StrategyConfig::new("s1", "One", "sched")).await;
        assert!(store.contains("s1").await);
        assert_eq!(store.get("s1").await.unwrap().name, "One");
        assert!(matches!(store.get("nope").await, Err(StoreError::StrategyNotFound(_))));
    }
}
