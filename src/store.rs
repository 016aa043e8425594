// src/store.rs

use crate::config::simulate_latency;
use crate::models::{NewRecord, RecordPatch, UploadRecord, UploadStatus};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("File not found: record {0}")]
    NotFound(u64),
    #[error("record {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: u64,
        from: UploadStatus,
        to: UploadStatus,
    },
    #[error("no record ids left to assign")]
    IdsExhausted,
}

/// CRUD access to upload records. Every method hands out copies, so callers
/// can never mutate stored state in place.
#[async_trait]
pub trait UploadStore: Send + Sync {
    async fn list_all(&self) -> Result<Vec<UploadRecord>, StoreError>;

    async fn get_by_id(&self, id: u64) -> Result<UploadRecord, StoreError>;

    /// Stores a new `pending` record under a fresh id.
    async fn create(&self, record: NewRecord) -> Result<UploadRecord, StoreError>;

    async fn update(&self, id: u64, patch: RecordPatch) -> Result<UploadRecord, StoreError>;

    async fn delete(&self, id: u64) -> Result<UploadRecord, StoreError>;
}

/// Artificial delay applied before each store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLatency {
    pub list: Duration,
    pub get: Duration,
    pub create: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl StoreLatency {
    pub fn none() -> Self {
        Self {
            list: Duration::ZERO,
            get: Duration::ZERO,
            create: Duration::ZERO,
            update: Duration::ZERO,
            delete: Duration::ZERO,
        }
    }
}

impl Default for StoreLatency {
    fn default() -> Self {
        Self {
            list: Duration::from_millis(300),
            get: Duration::from_millis(200),
            create: Duration::from_millis(500),
            update: Duration::from_millis(200),
            delete: Duration::from_millis(300),
        }
    }
}

/// Keeps upload records in process memory. Nothing survives a restart.
pub struct MemoryStore {
    records: Mutex<Vec<UploadRecord>>,
    /// Next id to hand out; 0 once the id space is used up.
    next_id: AtomicU64,
    latency: StoreLatency,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_records(Vec::new())
    }

    /// Starts from existing records. Ids continue after the largest one.
    pub fn with_records(records: Vec<UploadRecord>) -> Self {
        let max_id = records.iter().map(|r| r.id).max().unwrap_or(0);
        Self {
            records: Mutex::new(records),
            next_id: AtomicU64::new(max_id.checked_add(1).unwrap_or(0)),
            latency: StoreLatency::default(),
        }
    }

    pub fn with_latency(mut self, latency: StoreLatency) -> Self {
        self.latency = latency;
        self
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UploadStore for MemoryStore {
    async fn list_all(&self) -> Result<Vec<UploadRecord>, StoreError> {
        simulate_latency(self.latency.list).await;
        Ok(self.records.lock().await.clone())
    }

    async fn get_by_id(&self, id: u64) -> Result<UploadRecord, StoreError> {
        simulate_latency(self.latency.get).await;
        self.records
            .lock()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn create(&self, record: NewRecord) -> Result<UploadRecord, StoreError> {
        simulate_latency(self.latency.create).await;
        let id = self
            .next_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |next| {
                (next != 0).then(|| next.checked_add(1).unwrap_or(0))
            })
            .map_err(|_| StoreError::IdsExhausted)?;
        let record = UploadRecord::new(id, record);
        self.records.lock().await.push(record.clone());
        debug!(record_id = id, name = %record.name, "record created");
        Ok(record)
    }

    async fn update(&self, id: u64, patch: RecordPatch) -> Result<UploadRecord, StoreError> {
        simulate_latency(self.latency.update).await;
        let mut records = self.records.lock().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::NotFound(id))?;
        if let Some(next) = patch.status {
            if !record.status.can_transition_to(next) {
                return Err(StoreError::InvalidTransition {
                    id,
                    from: record.status,
                    to: next,
                });
            }
        }
        record.apply(patch);
        Ok(record.clone())
    }

    async fn delete(&self, id: u64) -> Result<UploadRecord, StoreError> {
        simulate_latency(self.latency.delete).await;
        let mut records = self.records.lock().await;
        let index = records
            .iter()
            .position(|r| r.id == id)
            .ok_or(StoreError::NotFound(id))?;
        let removed = records.remove(index);
        debug!(record_id = id, "record deleted");
        Ok(removed)
    }
}
