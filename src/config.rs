// src/config.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;
const DEFAULT_MAX_CONCURRENT_UPLOADS: usize = 5;
const DEFAULT_ALLOWED_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/svg+xml",
    "application/pdf",
    "text/plain",
    "text/csv",
    "application/json",
    "application/zip",
    "video/mp4",
    "audio/mpeg",
];

const GET_LATENCY: Duration = Duration::from_millis(100);
const UPDATE_LATENCY: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("maxConcurrentUploads must be at least 1")]
    InvalidConcurrency,
}

/// Validation limits applied to every submitted file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadConfig {
    /// Largest accepted file, in bytes.
    pub max_file_size: u64,
    /// Accepted MIME types. Empty means anything goes.
    #[serde(default)]
    pub allowed_types: BTreeSet<String>,
    pub max_concurrent_uploads: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_types: DEFAULT_ALLOWED_TYPES.iter().map(|t| t.to_string()).collect(),
            max_concurrent_uploads: DEFAULT_MAX_CONCURRENT_UPLOADS,
        }
    }
}

impl UploadConfig {
    pub fn new<I, S>(max_file_size: u64, allowed_types: I, max_concurrent_uploads: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            max_file_size,
            allowed_types: allowed_types.into_iter().map(Into::into).collect(),
            max_concurrent_uploads,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_uploads == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: UploadConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json_str(&json)
    }
}

/// An administrative override. Absent fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigUpdate {
    pub max_file_size: Option<u64>,
    pub allowed_types: Option<BTreeSet<String>>,
    pub max_concurrent_uploads: Option<usize>,
}

/// Hands out snapshots of the upload limits.
pub struct ConfigProvider {
    config: RwLock<UploadConfig>,
    get_latency: Duration,
    update_latency: Duration,
}

impl ConfigProvider {
    pub fn new(config: UploadConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config: RwLock::new(config),
            get_latency: GET_LATENCY,
            update_latency: UPDATE_LATENCY,
        })
    }

    /// Loads the limits from a JSON file.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = UploadConfig::from_file(path).await?;
        info!(path = %path.display(), "loaded upload config");
        Self::new(config)
    }

    /// Disables the simulated latency.
    pub fn without_latency(mut self) -> Self {
        self.get_latency = Duration::ZERO;
        self.update_latency = Duration::ZERO;
        self
    }

    pub async fn get_config(&self) -> UploadConfig {
        simulate_latency(self.get_latency).await;
        self.config.read().await.clone()
    }

    pub async fn update_config(&self, update: ConfigUpdate) -> Result<UploadConfig, ConfigError> {
        simulate_latency(self.update_latency).await;
        let mut config = self.config.write().await;
        let mut merged = config.clone();
        if let Some(size) = update.max_file_size {
            merged.max_file_size = size;
        }
        if let Some(types) = update.allowed_types {
            merged.allowed_types = types;
        }
        if let Some(limit) = update.max_concurrent_uploads {
            merged.max_concurrent_uploads = limit;
        }
        merged.validate()?;
        debug!(?merged, "upload config overridden");
        *config = merged.clone();
        Ok(merged)
    }
}

impl Default for ConfigProvider {
    fn default() -> Self {
        Self {
            config: RwLock::new(UploadConfig::default()),
            get_latency: GET_LATENCY,
            update_latency: UPDATE_LATENCY,
        }
    }
}

pub(crate) async fn simulate_latency(latency: Duration) {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_camel_case_json() {
        let config = UploadConfig::from_json_str(
            r#"{"maxFileSize": 1000, "allowedTypes": ["image/png"], "maxConcurrentUploads": 1}"#,
        )
        .unwrap();
        assert_eq!(config, UploadConfig::new(1000, ["image/png"], 1));
    }

    #[test]
    fn missing_allowed_types_means_unrestricted() {
        let config =
            UploadConfig::from_json_str(r#"{"maxFileSize": 10, "maxConcurrentUploads": 2}"#).unwrap();
        assert!(config.allowed_types.is_empty());
    }

    #[test]
    fn rejects_zero_concurrency() {
        let err = UploadConfig::from_json_str(r#"{"maxFileSize": 10, "maxConcurrentUploads": 0}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConcurrency));
        assert!(ConfigProvider::new(UploadConfig::new(10, Vec::<String>::new(), 0)).is_err());
    }

    #[tokio::test]
    async fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"maxFileSize": 2048, "maxConcurrentUploads": 3}}"#).unwrap();

        let provider = ConfigProvider::load(file.path()).await.unwrap().without_latency();
        let config = provider.get_config().await;
        assert_eq!(config.max_file_size, 2048);
        assert_eq!(config.max_concurrent_uploads, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn update_merges_present_fields() {
        let provider = ConfigProvider::default();
        let updated = provider
            .update_config(ConfigUpdate {
                max_concurrent_uploads: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.max_concurrent_uploads, 2);
        assert_eq!(updated.max_file_size, DEFAULT_MAX_FILE_SIZE);
        assert_eq!(provider.get_config().await, updated);

        let err = provider
            .update_config(ConfigUpdate {
                max_concurrent_uploads: Some(0),
                ..Default::default()
            })
            .await;
        assert!(err.is_err());
        assert_eq!(provider.get_config().await.max_concurrent_uploads, 2);
    }
}
