// src/simulator.rs

use crate::models::{FileDescriptor, NewRecord, RecordPatch, UploadRecord, UploadStatus};
use crate::store::{StoreError, UploadStore};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Number of progress updates per upload; one percent each.
pub const TOTAL_STEPS: u8 = 100;
pub const DEFAULT_CDN_ROOT: &str = "https://cdn.dropzone.com";

const MIN_BASE_SPEED: f64 = 500_000.0;
const MAX_BASE_SPEED: f64 = 1_500_000.0;
const SPEED_JITTER: f64 = 100_000.0;
const MIN_STEP_DELAY_MS: u64 = 50;
const MAX_STEP_DELAY_MS: u64 = 150;

/// Everything `encodeURIComponent` escapes.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("{0}")]
    Store(#[from] StoreError),
    #[error("Upload cancelled")]
    Cancelled,
}

/// Source of the randomized timing and throughput of a simulated upload.
pub trait RandomSource: Send + Sync {
    /// Base throughput in bytes per second, drawn once per run.
    fn base_speed(&self) -> f64;
    /// Offset added to the base throughput at each step.
    fn speed_jitter(&self) -> f64;
    /// Pause before each step.
    fn step_delay(&self) -> Duration;
}

/// Real randomness from the thread-local generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRandom;

impl RandomSource for SystemRandom {
    fn base_speed(&self) -> f64 {
        rand::thread_rng().gen_range(MIN_BASE_SPEED..=MAX_BASE_SPEED)
    }

    fn speed_jitter(&self) -> f64 {
        rand::thread_rng().gen_range(-SPEED_JITTER..=SPEED_JITTER)
    }

    fn step_delay(&self) -> Duration {
        Duration::from_millis(rand::thread_rng().gen_range(MIN_STEP_DELAY_MS..=MAX_STEP_DELAY_MS))
    }
}

/// Constant values, for deterministic runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom {
    pub base_speed: f64,
    pub speed_jitter: f64,
    pub step_delay: Duration,
}

impl Default for FixedRandom {
    fn default() -> Self {
        Self {
            base_speed: 1_000_000.0,
            speed_jitter: 0.0,
            step_delay: Duration::from_millis(100),
        }
    }
}

impl RandomSource for FixedRandom {
    fn base_speed(&self) -> f64 {
        self.base_speed
    }

    fn speed_jitter(&self) -> f64 {
        self.speed_jitter
    }

    fn step_delay(&self) -> Duration {
        self.step_delay
    }
}

/// Drives a single record from `pending` to `completed` through fabricated
/// progress updates.
pub struct UploadSimulator {
    store: Arc<dyn UploadStore>,
    random: Arc<dyn RandomSource>,
    cdn_root: String,
}

impl UploadSimulator {
    pub fn new(store: Arc<dyn UploadStore>) -> Self {
        Self {
            store,
            random: Arc::new(SystemRandom),
            cdn_root: DEFAULT_CDN_ROOT.to_string(),
        }
    }

    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    pub fn with_cdn_root(mut self, cdn_root: impl Into<String>) -> Self {
        self.cdn_root = cdn_root.into().trim_end_matches('/').to_string();
        self
    }

    /// The public location of a completed upload.
    pub fn completion_url(&self, id: u64, name: &str) -> String {
        format!(
            "{}/files/{}/{}",
            self.cdn_root,
            id,
            utf8_percent_encode(name, URI_COMPONENT)
        )
    }

    /// Creates a record for `file` and runs it to completion.
    pub async fn simulate<F>(
        &self,
        file: &FileDescriptor,
        on_progress: F,
    ) -> Result<UploadRecord, SimulationError>
    where
        F: FnMut(&UploadRecord) + Send,
    {
        let record = self.store.create(NewRecord::from(file)).await?;
        self.run(record.id, on_progress, &CancellationToken::new()).await
    }

    /// Progresses an existing record one percent per step. `on_progress`
    /// sees every stored update, in order. Returns the record as stored by
    /// the completing write.
    pub async fn run<F>(
        &self,
        id: u64,
        mut on_progress: F,
        cancel: &CancellationToken,
    ) -> Result<UploadRecord, SimulationError>
    where
        F: FnMut(&UploadRecord) + Send,
    {
        let record = self
            .store
            .update(id, RecordPatch::status(UploadStatus::Uploading))
            .await?;
        on_progress(&record);
        info!(record_id = id, name = %record.name, size = record.size, "upload started");

        let size = record.size as f64;
        let url = self.completion_url(id, &record.name);
        let base_speed = self.random.base_speed();

        for step in 1..TOTAL_STEPS {
            self.wait_step(cancel).await?;
            let patch = self.step_patch(step, size, base_speed);
            let updated = self.store.update(id, patch).await?;
            debug!(record_id = id, progress = step, "upload progressed");
            on_progress(&updated);
        }

        // The last step completes the record and publishes its URL in one
        // write, so a record is never `completed` without a URL.
        self.wait_step(cancel).await?;
        let patch = RecordPatch {
            url: Some(url),
            ..self.step_patch(TOTAL_STEPS, size, base_speed)
        };
        let finished = self.store.update(id, patch).await?;
        on_progress(&finished);
        info!(record_id = id, url = %finished.url, "upload completed");
        Ok(finished)
    }

    async fn wait_step(&self, cancel: &CancellationToken) -> Result<(), SimulationError> {
        tokio::select! {
            _ = tokio::time::sleep(self.random.step_delay()) => Ok(()),
            _ = cancel.cancelled() => Err(SimulationError::Cancelled),
        }
    }

    fn step_patch(&self, progress: u8, size: f64, base_speed: f64) -> RecordPatch {
        let upload_speed = (base_speed + self.random.speed_jitter()).max(0.0);
        let remaining_bytes = size * (1.0 - f64::from(progress) / 100.0);
        let time_remaining = if upload_speed > 0.0 {
            remaining_bytes / upload_speed
        } else {
            0.0
        };
        let status = if progress >= 100 {
            UploadStatus::Completed
        } else {
            UploadStatus::Uploading
        };
        RecordPatch {
            status: Some(status),
            progress: Some(progress),
            upload_speed: Some(upload_speed),
            time_remaining: Some(time_remaining),
            ..Default::default()
        }
    }
}
