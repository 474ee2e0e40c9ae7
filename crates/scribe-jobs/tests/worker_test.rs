//! Worker lifecycle tests: background processing, events, shutdown.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use scribe_core::{AdapterSet, NoteStatus, Stage, StaticAdapters};
use scribe_db::{Database, StoreConfig};
use scribe_inference::mock::{MockAnalyzer, MockEmbedder, MockNotifier, MockTranscriber};
use scribe_jobs::{
    BackoffPolicy, JobWorker, NoteService, Orchestrator, PipelineConfig, WorkerConfig,
    WorkerEvent,
};
use scribe_search::VectorIndex;

fn build(
    config: WorkerConfig,
) -> (Database, Arc<VectorIndex>, JobWorker, NoteService) {
    let db = Database::in_memory(StoreConfig::default());
    let index = Arc::new(VectorIndex::new());
    let adapters = Arc::new(StaticAdapters::new(AdapterSet {
        transcriber: Arc::new(MockTranscriber::new("hello world")),
        analyzer: Arc::new(MockAnalyzer::new("greeting", &["greeting"])),
        embedder: Arc::new(MockEmbedder::fixed(vec![1.0, 0.0, 0.0], "mock-embed-v1")),
        notifier: Arc::new(MockNotifier::new()),
    }));
    let orchestrator = Arc::new(Orchestrator::new(
        db.clone(),
        index.clone(),
        adapters,
        PipelineConfig::default().with_backoff(BackoffPolicy::none()),
    ));
    let worker = JobWorker::new(db.clone(), orchestrator, config);
    let service = NoteService::new(db.clone(), index.clone());
    (db, index, worker, service)
}

#[tokio::test]
async fn worker_processes_uploads_in_the_background() {
    let (db, index, worker, service) = build(WorkerConfig::default().with_poll_interval(10));
    let mut events = worker.events();
    let handle = worker.start();

    let note_id = service
        .upload_audio(Uuid::new_v4(), "audio/a.wav")
        .await
        .unwrap();

    // Wait for the embed stage to complete.
    let deadline = Duration::from_secs(10);
    loop {
        let event = tokio::time::timeout(deadline, events.recv())
            .await
            .expect("worker made no progress")
            .expect("event bus closed");
        if matches!(
            event,
            WorkerEvent::JobCompleted {
                stage: Stage::Embed,
                ..
            }
        ) {
            break;
        }
    }

    let note = db.notes.fetch(note_id).await.unwrap();
    assert_eq!(note.status, NoteStatus::Indexed);
    assert!(index.contains(note_id));

    handle.shutdown().await.unwrap();
    let deadline = Duration::from_secs(10);
    let mut events = handle.events();
    loop {
        match tokio::time::timeout(deadline, events.recv()).await {
            Ok(Ok(WorkerEvent::WorkerStopped)) => break,
            Ok(Ok(_)) => continue,
            Ok(Err(_)) | Err(_) => break,
        }
    }
}

#[tokio::test]
async fn disabled_worker_processes_nothing() {
    let (db, _index, worker, service) =
        build(WorkerConfig::default().with_enabled(false).with_poll_interval(10));
    let _handle = worker.start();

    let note_id = service
        .upload_audio(Uuid::new_v4(), "audio/a.wav")
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let note = db.notes.fetch(note_id).await.unwrap();
    assert_eq!(note.status, NoteStatus::Uploaded);
    assert!(db.jobs.active_for_note(note_id).await.unwrap().is_some());
}

#[tokio::test]
async fn drain_reports_processed_job_count() {
    let (db, _index, worker, service) = build(WorkerConfig::default());

    for _ in 0..2 {
        service
            .upload_audio(Uuid::new_v4(), "audio/a.wav")
            .await
            .unwrap();
    }

    // Two notes, three stages each.
    let processed = worker.drain().await.unwrap();
    assert_eq!(processed, 6);
    assert_eq!(db.jobs.pending_count().await.unwrap(), 0);
}
