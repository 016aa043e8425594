use dropzone::prelude::*;
use dropzone::store::StoreError;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

async fn setup(
    config: UploadConfig,
) -> (Arc<MemoryStore>, Arc<UploadOrchestrator>, UnboundedReceiver<Notification>) {
    // Default latencies; the paused clock makes them free.
    let store = Arc::new(MemoryStore::new());
    let simulator =
        UploadSimulator::new(store.clone()).with_random(Arc::new(FixedRandom::default()));
    let provider = ConfigProvider::new(config).unwrap();
    let (orchestrator, notifications) = UploadOrchestrator::new(store.clone(), simulator, &provider)
        .await
        .unwrap();
    (store, Arc::new(orchestrator), notifications)
}

fn single_png_config() -> UploadConfig {
    UploadConfig::new(1000, ["image/png"], 1)
}

fn drain(rx: &mut UnboundedReceiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(n) = rx.try_recv() {
        out.push(n);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn single_upload_completes_and_second_waits_for_capacity() {
    let (store, orchestrator, mut notifications) = setup(single_png_config()).await;

    let ids = orchestrator
        .submit(vec![FileDescriptor::new("first.png", 500, "image/png")])
        .await;
    assert_eq!(ids.len(), 1);

    // A second file while the first is still running is turned away.
    let rejected = orchestrator
        .submit(vec![FileDescriptor::new("second.png", 500, "image/png")])
        .await;
    assert!(rejected.is_empty());
    let notes = drain(&mut notifications);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].to_string(), "Maximum 1 concurrent uploads allowed");

    orchestrator.wait_for_uploads().await;

    let record = store.get_by_id(ids[0]).await.unwrap();
    assert_eq!(record.status, UploadStatus::Completed);
    assert_eq!(record.progress, 100);
    assert!(!record.url.is_empty());
    assert_eq!(orchestrator.records(), vec![record]);
    assert_eq!(
        drain(&mut notifications)
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>(),
        vec!["first.png uploaded successfully!"]
    );

    // Once the first settles the slot is free again.
    let accepted = orchestrator
        .submit(vec![FileDescriptor::new("second.png", 500, "image/png")])
        .await;
    assert_eq!(accepted.len(), 1);
    orchestrator.wait_for_uploads().await;
    assert_eq!(orchestrator.stats().completed, 2);
}

#[tokio::test(start_paused = true)]
async fn oversized_file_is_rejected_without_a_record() {
    let (store, orchestrator, mut notifications) = setup(single_png_config()).await;

    let ids = orchestrator
        .submit(vec![FileDescriptor::new("huge.png", 2000, "image/png")])
        .await;

    assert!(ids.is_empty());
    assert!(store.list_all().await.unwrap().is_empty());
    assert!(orchestrator.records().is_empty());
    let notes = drain(&mut notifications);
    assert_eq!(notes.len(), 1);
    assert!(notes[0].to_string().contains("1000 Bytes"));
    assert_eq!(notes[0].level(), NotificationLevel::Error);
}

#[tokio::test(start_paused = true)]
async fn deleting_unknown_id_leaves_store_untouched() {
    let (store, orchestrator, _notifications) = setup(single_png_config()).await;
    orchestrator
        .submit(vec![FileDescriptor::new("kept.png", 500, "image/png")])
        .await;
    orchestrator.wait_for_uploads().await;
    let before = store.list_all().await.unwrap();

    assert!(matches!(store.delete(9999).await, Err(StoreError::NotFound(9999))));
    assert!(orchestrator.remove(9999).await.is_err());
    assert_eq!(store.list_all().await.unwrap(), before);
    assert_eq!(orchestrator.records().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_uploads_each_progress_in_order() {
    let (_store, orchestrator, _notifications) =
        setup(UploadConfig::new(10_000, Vec::<String>::new(), 3)).await;
    let mut updates = orchestrator.subscribe();

    orchestrator
        .submit(vec![
            FileDescriptor::new("a.bin", 9000, "application/octet-stream"),
            FileDescriptor::new("b.bin", 3000, "application/octet-stream"),
            FileDescriptor::new("c.bin", 6000, "application/octet-stream"),
        ])
        .await;

    let mut last = std::collections::HashMap::new();
    loop {
        let snapshot = updates.borrow_and_update().clone();
        for record in &snapshot {
            let previous = last.insert(record.id, record.progress).unwrap_or(0);
            assert!(record.progress >= previous, "progress went backwards for {}", record.name);
        }
        if snapshot.len() == 3 && snapshot.iter().all(|r| !r.url.is_empty()) {
            break;
        }
        updates.changed().await.unwrap();
    }

    let stats = orchestrator.stats();
    assert_eq!(stats.completed, 3);
    assert_eq!(stats.uploading, 0);
    assert_eq!(stats.total_size, 18_000);
    orchestrator.wait_for_uploads().await;
    assert_eq!(orchestrator.in_flight(), 0);
}
