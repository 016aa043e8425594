// src/main.rs

use anyhow::{Context, Result};
use dropzone::prelude::*;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CONFIG_ENV: &str = "DROPZONE_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "dropzone=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let provider = match std::env::var_os(CONFIG_ENV) {
        Some(path) => ConfigProvider::load(&PathBuf::from(path))
            .await
            .context("failed to load upload config")?,
        None => ConfigProvider::default(),
    };

    // Files named on the command line, or a small demo batch.
    let mut files = Vec::new();
    for arg in std::env::args_os().skip(1) {
        let path = PathBuf::from(arg);
        let file = FileDescriptor::from_path(&path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        files.push(file);
    }
    if files.is_empty() {
        files = vec![
            FileDescriptor::new("holiday.png", 2_400_000, "image/png"),
            FileDescriptor::new("report.pdf", 850_000, "application/pdf"),
            FileDescriptor::new("setup.exe", 12_000_000, "application/x-msdownload"),
        ];
    }

    let store: Arc<dyn UploadStore> = Arc::new(MemoryStore::new());
    let simulator = UploadSimulator::new(store.clone());
    let (orchestrator, mut notifications) =
        UploadOrchestrator::new(store, simulator, &provider).await?;
    let orchestrator = Arc::new(orchestrator);

    let config = orchestrator.config();
    println!(
        "Upload limits: max file size {}, {} concurrent uploads",
        format_file_size(config.max_file_size),
        config.max_concurrent_uploads
    );

    let printer = tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            println!("[{:?}] {}", notification.level(), notification);
        }
    });

    let mut updates = orchestrator.subscribe();
    let watcher = tokio::spawn(async move {
        let mut printed: HashMap<u64, u8> = HashMap::new();
        while updates.changed().await.is_ok() {
            for record in updates.borrow_and_update().iter() {
                let milestone = record.progress - record.progress % 25;
                if record.status != UploadStatus::Uploading
                    || printed.get(&record.id).is_some_and(|last| *last >= milestone)
                {
                    continue;
                }
                printed.insert(record.id, milestone);
                println!(
                    "  {} {:>3}% at {}, {} left",
                    record.name,
                    record.progress,
                    format_upload_speed(record.upload_speed),
                    format_time_remaining(record.time_remaining)
                );
            }
        }
    });

    orchestrator.submit(files).await;
    orchestrator.wait_for_uploads().await;

    for record in orchestrator.records() {
        println!("{} ({}) -> {} {}", record.name, format_file_size(record.size), record.status, record.url);
    }
    let stats = orchestrator.stats();
    println!(
        "{} completed, {} uploading, {} total",
        stats.completed,
        stats.uploading,
        format_file_size(stats.total_size)
    );

    orchestrator.clear_all().await;
    watcher.abort();
    drop(orchestrator);
    let _ = printer.await;
    Ok(())
}
