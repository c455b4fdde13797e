//! In-memory store implementations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bitforge_types::{
    BitBuffer, BufferId, BufferKind, ExecutionPipelineResult, FileHandle, ResultId, ResultRecord,
};
use chrono::Utc;
use tokio::sync::RwLock;

use super::{BufferRecord, FileStore, ResultsStore, StoreError, StoreResult};

/// In-memory [`FileStore`].
#[derive(Debug, Default)]
pub struct MemoryFileStore {
    next_id: AtomicU64,
    buffers: RwLock<HashMap<BufferId, BufferRecord>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self { next_id: AtomicU64::new(1), buffers: RwLock::new(HashMap::new()) }
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn create_file(&self, name: &str, bits: BitBuffer, kind: BufferKind) -> FileHandle {
        let id = BufferId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let handle = FileHandle { id, name: name.to_string(), kind, created_at: Utc::now() };
        let record = BufferRecord { handle: handle.clone(), bits };
        self.buffers.write().await.insert(id, record);
        handle
    }

    async fn get_file(&self, id: BufferId) -> StoreResult<BufferRecord> {
        self.buffers
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::BufferNotFound(id))
    }

    async fn delete_file(&self, id: BufferId) -> StoreResult<()> {
        self.buffers
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::BufferNotFound(id))
    }
}

/// In-memory [`ResultsStore`].
#[derive(Debug, Default)]
pub struct MemoryResultsStore {
    next_id: AtomicU64,
    records: RwLock<Vec<ResultRecord>>,
}

impl MemoryResultsStore {
    pub fn new() -> Self {
        Self { next_id: AtomicU64::new(1), records: RwLock::new(Vec::new()) }
    }
}

#[async_trait]
impl ResultsStore for MemoryResultsStore {
    async fn create_result(&self, result: ExecutionPipelineResult) -> ResultRecord {
        let record = ResultRecord {
            id: ResultId(self.next_id.fetch_add(1, Ordering::SeqCst)),
            created_at: Utc::now(),
            result,
        };
        self.records.write().await.push(record.clone());
        record
    }

    async fn get_result(&self, id: ResultId) -> StoreResult<ResultRecord> {
        self.records
            .read()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(StoreError::ResultNotFound(id))
    }

    async fn list_results(&self) -> Vec<ResultRecord> {
        self.records.read().await.clone()
    }
}
