// src/models.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// The lifecycle status of an upload record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Completed,
    Error,
}

impl UploadStatus {
    /// `Completed` and `Error` admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Error)
    }

    /// Whether a record may move from `self` to `next`.
    /// Re-asserting the current status is always allowed.
    pub fn can_transition_to(self, next: UploadStatus) -> bool {
        use UploadStatus::*;
        self == next
            || matches!(
                (self, next),
                (Pending, Uploading) | (Uploading, Completed) | (Uploading, Error)
            )
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Completed => "completed",
            UploadStatus::Error => "error",
        };
        f.write_str(label)
    }
}

/// One file's upload state and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub id: u64,
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    pub mime_type: String,
    pub status: UploadStatus,
    /// Percent complete, 0 to 100.
    pub progress: u8,
    /// Estimated bytes per second.
    pub upload_speed: f64,
    /// Estimated seconds until completion.
    pub time_remaining: f64,
    /// Empty until the upload completes.
    pub url: String,
    pub error: Option<String>,
}

impl UploadRecord {
    /// Builds a fresh record with every progress field at its default.
    pub fn new(id: u64, record: NewRecord) -> Self {
        Self {
            id,
            name: record.name,
            size: record.size,
            mime_type: record.mime_type,
            status: UploadStatus::Pending,
            progress: 0,
            upload_speed: 0.0,
            time_remaining: 0.0,
            url: String::new(),
            error: None,
        }
    }

    /// Merges a patch into the record. The patch's `id` is never applied.
    pub fn apply(&mut self, patch: RecordPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(progress) = patch.progress {
            self.progress = progress.min(100);
        }
        if let Some(speed) = patch.upload_speed {
            self.upload_speed = speed.max(0.0);
        }
        if let Some(remaining) = patch.time_remaining {
            self.time_remaining = remaining.max(0.0);
        }
        if let Some(url) = patch.url {
            self.url = url;
        }
        if let Some(error) = patch.error {
            self.error = error;
        }
    }
}

/// The caller-supplied part of a record; the store fills in the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRecord {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
}

impl From<&FileDescriptor> for NewRecord {
    fn from(file: &FileDescriptor) -> Self {
        Self {
            name: file.name.clone(),
            size: file.size,
            mime_type: file.mime_type.clone(),
        }
    }
}

/// A partial update to a stored record. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordPatch {
    /// Ignored by every store; ids cannot be altered.
    pub id: Option<u64>,
    pub status: Option<UploadStatus>,
    pub progress: Option<u8>,
    pub upload_speed: Option<f64>,
    pub time_remaining: Option<f64>,
    pub url: Option<String>,
    /// `Some(None)` clears the error message.
    pub error: Option<Option<String>>,
}

impl RecordPatch {
    pub fn status(status: UploadStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Marks a record as failed with a human-readable reason.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: Some(UploadStatus::Error),
            error: Some(Some(reason.into())),
            ..Default::default()
        }
    }
}

/// A raw file handed over by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    /// Where the content lives, if it came from disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl FileDescriptor {
    pub fn new(name: impl Into<String>, size: u64, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size,
            mime_type: mime_type.into(),
            path: None,
        }
    }

    /// Describes a file on disk, guessing its MIME type from the extension.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = tokio::fs::metadata(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Ok(Self {
            name,
            size: metadata.len(),
            mime_type,
            path: Some(path.to_path_buf()),
        })
    }
}

/// Aggregate counters over a list of records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStats {
    pub completed: usize,
    pub uploading: usize,
    pub total_size: u64,
}

impl UploadStats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a UploadRecord>) -> Self {
        records.into_iter().fold(Self::default(), |mut stats, record| {
            match record.status {
                UploadStatus::Completed => stats.completed += 1,
                UploadStatus::Uploading => stats.uploading += 1,
                _ => {}
            }
            stats.total_size += record.size;
            stats
        })
    }
}
