// src/orchestrator.rs

use crate::config::{ConfigProvider, UploadConfig};
use crate::limiter::{InFlightLimiter, InFlightPermit};
use crate::models::{FileDescriptor, NewRecord, RecordPatch, UploadRecord, UploadStats, UploadStatus};
use crate::simulator::{SimulationError, UploadSimulator};
use crate::store::{StoreError, UploadStore};
use crate::validator::{validate, Violation};
use futures_util::future::join_all;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("record {0} is not known")]
    RecordNotFound(u64),
}

/// How loudly a notification should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Warning,
    Error,
}

/// One user-visible outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    ValidationFailed { name: String, violations: Vec<Violation> },
    CapacityExceeded { max_concurrent_uploads: usize },
    UploadSucceeded { name: String },
    UploadFailed { name: String, reason: String },
    UploadCancelled { name: String },
    Removed { id: u64 },
    RemoveFailed { id: u64, reason: String },
    Cleared { count: usize },
    ClearFailed { failed: usize, total: usize },
}

impl Notification {
    pub fn level(&self) -> NotificationLevel {
        match self {
            Notification::UploadSucceeded { .. }
            | Notification::Removed { .. }
            | Notification::Cleared { .. } => NotificationLevel::Success,
            Notification::CapacityExceeded { .. } | Notification::UploadCancelled { .. } => {
                NotificationLevel::Warning
            }
            Notification::ValidationFailed { .. }
            | Notification::UploadFailed { .. }
            | Notification::RemoveFailed { .. }
            | Notification::ClearFailed { .. } => NotificationLevel::Error,
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::ValidationFailed { name, violations } => {
                let reasons: Vec<String> = violations.iter().map(ToString::to_string).collect();
                write!(f, "{}: {}", name, reasons.join(", "))
            }
            Notification::CapacityExceeded {
                max_concurrent_uploads,
            } => write!(f, "Maximum {max_concurrent_uploads} concurrent uploads allowed"),
            Notification::UploadSucceeded { name } => write!(f, "{name} uploaded successfully!"),
            Notification::UploadFailed { name, reason } => {
                write!(f, "Failed to upload {name}: {reason}")
            }
            Notification::UploadCancelled { name } => write!(f, "Upload of {name} was cancelled"),
            Notification::Removed { .. } => write!(f, "File removed successfully"),
            Notification::RemoveFailed { .. } => write!(f, "Failed to remove file"),
            Notification::Cleared { .. } => write!(f, "All files cleared"),
            Notification::ClearFailed { failed, total } => {
                write!(f, "Failed to clear {failed} of {total} files")
            }
        }
    }
}

/// Admits validated files under the concurrency ceiling and runs one
/// simulated upload per admitted file.
pub struct UploadOrchestrator {
    store: Arc<dyn UploadStore>,
    simulator: Arc<UploadSimulator>,
    config: UploadConfig,
    limiter: InFlightLimiter,
    records: watch::Sender<Vec<UploadRecord>>,
    notifications: mpsc::UnboundedSender<Notification>,
    active_uploads: Arc<Mutex<HashMap<u64, JoinHandle<()>>>>,
    cancellation_tokens: Arc<Mutex<HashMap<u64, CancellationToken>>>,
}

impl UploadOrchestrator {
    /// Fetches the config once and seeds the record list from the store.
    pub async fn new(
        store: Arc<dyn UploadStore>,
        simulator: UploadSimulator,
        config_provider: &ConfigProvider,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Notification>), OrchestratorError> {
        let (existing, config) = tokio::join!(store.list_all(), config_provider.get_config());
        let existing = existing?;
        info!(
            records = existing.len(),
            max_concurrent_uploads = config.max_concurrent_uploads,
            "orchestrator ready"
        );

        let (records, _) = watch::channel(existing);
        let (notifications, receiver) = mpsc::unbounded_channel();
        let orchestrator = Self {
            store,
            simulator: Arc::new(simulator),
            limiter: InFlightLimiter::new(config.max_concurrent_uploads),
            config,
            records,
            notifications,
            active_uploads: Arc::new(Mutex::new(HashMap::new())),
            cancellation_tokens: Arc::new(Mutex::new(HashMap::new())),
        };
        Ok((orchestrator, receiver))
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// A snapshot of every known record.
    pub fn records(&self) -> Vec<UploadRecord> {
        self.records.borrow().clone()
    }

    /// Observes the record list; a new value is published on every change.
    pub fn subscribe(&self) -> watch::Receiver<Vec<UploadRecord>> {
        self.records.subscribe()
    }

    pub fn stats(&self) -> UploadStats {
        UploadStats::from_records(self.records.borrow().iter())
    }

    pub fn in_flight(&self) -> usize {
        self.limiter.in_flight()
    }

    /// Whether a drop target should accept more files.
    pub fn is_accepting(&self) -> bool {
        self.limiter.has_capacity()
    }

    /// Validates a batch and starts an upload for every acceptable file.
    /// Returns the ids of the records created; empty when the batch was
    /// turned away.
    pub async fn submit(self: &Arc<Self>, files: Vec<FileDescriptor>) -> Vec<u64> {
        self.prune_finished_uploads().await;

        let mut valid = Vec::with_capacity(files.len());
        for file in files {
            let violations = validate(&file, &self.config);
            if violations.is_empty() {
                valid.push(file);
            } else {
                info!(name = %file.name, ?violations, "file rejected by validation");
                self.notify(Notification::ValidationFailed {
                    name: file.name,
                    violations,
                });
            }
        }
        if valid.is_empty() {
            return Vec::new();
        }

        let Some(permits) = self.limiter.try_acquire_many(valid.len()) else {
            warn!(
                in_flight = self.limiter.in_flight(),
                requested = valid.len(),
                ceiling = self.limiter.ceiling(),
                "batch rejected by concurrency ceiling"
            );
            self.notify(Notification::CapacityExceeded {
                max_concurrent_uploads: self.config.max_concurrent_uploads,
            });
            return Vec::new();
        };

        let created = join_all(valid.iter().map(|file| self.store.create(NewRecord::from(file)))).await;

        let mut ids = Vec::with_capacity(created.len());
        for ((file, result), permit) in valid.into_iter().zip(created).zip(permits) {
            match result {
                Ok(record) => {
                    ids.push(record.id);
                    self.records.send_modify(|records| records.push(record.clone()));
                    self.spawn_upload(record, permit).await;
                }
                Err(e) => {
                    warn!(name = %file.name, error = %e, "could not create upload record");
                    self.notify(Notification::UploadFailed {
                        name: file.name,
                        reason: e.to_string(),
                    });
                }
            }
        }
        ids
    }

    async fn spawn_upload(self: &Arc<Self>, record: UploadRecord, permit: InFlightPermit) {
        let record_id = record.id;
        let cancellation_token = CancellationToken::new();
        self.cancellation_tokens
            .lock()
            .await
            .insert(record_id, cancellation_token.clone());

        let self_clone = self.clone();
        let handle = tokio::spawn(async move {
            let _permit = permit;
            let observer = self_clone.clone();
            let result = self_clone
                .simulator
                .run(
                    record_id,
                    move |updated| observer.replace_record(updated.clone()),
                    &cancellation_token,
                )
                .await;

            match result {
                Ok(finished) => {
                    self_clone.replace_record(finished);
                    self_clone.notify(Notification::UploadSucceeded { name: record.name });
                }
                Err(SimulationError::Cancelled) => {
                    info!(record_id, "upload cancelled");
                    self_clone.mark_failed(record_id, "Upload cancelled").await;
                    self_clone.notify(Notification::UploadCancelled { name: record.name });
                }
                Err(e) => {
                    let reason = e.to_string();
                    warn!(record_id, error = %reason, "upload failed");
                    self_clone.mark_failed(record_id, &reason).await;
                    self_clone.notify(Notification::UploadFailed {
                        name: record.name,
                        reason,
                    });
                }
            }
            self_clone.cancellation_tokens.lock().await.remove(&record_id);
        });

        self.active_uploads.lock().await.insert(record_id, handle);
    }

    fn replace_record(&self, record: UploadRecord) {
        self.records.send_modify(|records| {
            if let Some(slot) = records.iter_mut().find(|r| r.id == record.id) {
                *slot = record;
            }
        });
    }

    /// Downgrades a record to `error`, in the store when possible and in the
    /// observable list regardless.
    async fn mark_failed(&self, id: u64, reason: &str) {
        if let Err(e) = self.store.update(id, RecordPatch::failed(reason)).await {
            warn!(record_id = id, error = %e, "could not persist upload failure");
        }
        self.records.send_modify(|records| {
            if let Some(record) = records.iter_mut().find(|r| r.id == id) {
                if !record.status.is_terminal() {
                    record.status = UploadStatus::Error;
                    record.error = Some(reason.to_string());
                }
            }
        });
    }

    async fn prune_finished_uploads(&self) {
        self.active_uploads
            .lock()
            .await
            .retain(|_, handle| !handle.is_finished());
    }

    /// Waits until every upload started so far has settled.
    pub async fn wait_for_uploads(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut active = self.active_uploads.lock().await;
            active.drain().map(|(_, handle)| handle).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "upload task ended abnormally");
            }
        }
    }

    /// Asks an in-flight upload to stop at its next step.
    pub async fn cancel(&self, id: u64) -> Result<(), OrchestratorError> {
        match self.cancellation_tokens.lock().await.get(&id) {
            Some(token) => {
                token.cancel();
                Ok(())
            }
            None => Err(OrchestratorError::RecordNotFound(id)),
        }
    }

    /// Deletes a record, stopping its upload first if it is still running.
    pub async fn remove(&self, id: u64) -> Result<UploadRecord, OrchestratorError> {
        if let Some(token) = self.cancellation_tokens.lock().await.get(&id) {
            token.cancel();
        }
        match self.store.delete(id).await {
            Ok(removed) => {
                self.records.send_modify(|records| records.retain(|r| r.id != id));
                info!(record_id = id, "record removed");
                self.notify(Notification::Removed { id });
                Ok(removed)
            }
            Err(e) => {
                warn!(record_id = id, error = %e, "record removal failed");
                self.notify(Notification::RemoveFailed {
                    id,
                    reason: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    /// Removes every known record. Each deletion stands on its own; one
    /// failure does not keep the others from going through.
    pub async fn clear_all(&self) -> usize {
        let ids: Vec<u64> = self.records.borrow().iter().map(|r| r.id).collect();
        if ids.is_empty() {
            return 0;
        }
        {
            let tokens = self.cancellation_tokens.lock().await;
            for id in &ids {
                if let Some(token) = tokens.get(id) {
                    token.cancel();
                }
            }
        }

        let results = join_all(ids.iter().map(|id| self.store.delete(*id))).await;
        let mut removed = Vec::new();
        let mut failed = 0;
        for (id, result) in ids.iter().zip(results) {
            match result {
                Ok(_) => removed.push(*id),
                Err(e) => {
                    failed += 1;
                    warn!(record_id = id, error = %e, "record removal failed during clear");
                }
            }
        }
        self.records
            .send_modify(|records| records.retain(|r| !removed.contains(&r.id)));

        if failed == 0 {
            self.notify(Notification::Cleared {
                count: removed.len(),
            });
        } else {
            self.notify(Notification::ClearFailed {
                failed,
                total: ids.len(),
            });
        }
        removed.len()
    }

    fn notify(&self, notification: Notification) {
        // Nobody listening is not an error.
        let _ = self.notifications.send(notification);
    }
}
