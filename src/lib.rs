pub mod config;
pub mod format;
pub mod limiter;
pub mod models;
pub mod orchestrator;
pub mod simulator;
pub mod store;
pub mod validator;

/// Re-exports of the types most callers need.
pub mod prelude {
    pub use crate::config::{ConfigProvider, ConfigUpdate, UploadConfig};
    pub use crate::format::{format_file_size, format_time_remaining, format_upload_speed};
    pub use crate::models::{FileDescriptor, UploadRecord, UploadStats, UploadStatus};
    pub use crate::orchestrator::{Notification, NotificationLevel, UploadOrchestrator};
    pub use crate::simulator::{FixedRandom, RandomSource, SystemRandom, UploadSimulator};
    pub use crate::store::{MemoryStore, StoreLatency, UploadStore};
}
