//! End-to-end pipeline tests: upload through indexing with mock adapters.

mod common;

use std::sync::Arc;

use uuid::Uuid;

use common::{harness, harness_with, MODEL_V1};
use scribe_core::{
    AdapterError, AdapterSet, EditNoteRequest, Error, ErrorKind, NoteStatus, StaticAdapters,
};
use scribe_db::StoreConfig;
use scribe_inference::mock::{MockAnalyzer, MockEmbedder, MockNotifier, MockTranscriber};
use scribe_jobs::{
    BackoffPolicy, JobWorker, Orchestrator, PipelineConfig, ProcessOutcome, WorkerConfig,
};

#[tokio::test]
async fn upload_reaches_indexed_with_all_enrichments() {
    let h = harness();
    let owner = Uuid::new_v4();

    let note_id = h.service.upload_audio(owner, "audio/greeting.wav").await.unwrap();
    assert_eq!(
        h.service.note_status(note_id).await.unwrap().status,
        NoteStatus::Uploaded
    );

    h.worker.drain().await.unwrap();

    let note = h.db.notes.fetch(note_id).await.unwrap();
    assert_eq!(note.status, NoteStatus::Indexed);
    assert_eq!(note.transcript.as_deref(), Some("hello world"));
    assert_eq!(note.summary.as_deref(), Some("greeting"));
    assert_eq!(note.tags, vec!["greeting"]);
    assert!(!note.analysis_degraded);
    assert_eq!(note.embedding_model_version.as_deref(), Some(MODEL_V1));
    assert_eq!(note.retry_count, 0);

    let records = h.db.embeddings.list_for_note(note_id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].vector.as_slice(), &[1.0, 0.0, 0.0]);
    assert_eq!(records[0].model_version, MODEL_V1);

    assert!(h.index.contains(note_id));

    let deliveries = h.notifier.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0], (note_id, "greeting".to_string()));

    // Each adapter ran exactly once.
    assert_eq!(h.transcriber.calls(), 1);
    assert_eq!(h.analyzer.calls(), 1);
    assert_eq!(h.embedder.calls(), 1);
}

#[tokio::test]
async fn status_moves_forward_through_the_stage_graph() {
    let h = harness();
    let owner = Uuid::new_v4();
    let note_id = h.service.upload_audio(owner, "audio/a.wav").await.unwrap();

    let mut observed = vec![h.db.notes.fetch(note_id).await.unwrap().status];
    while let Some(job) = h.db.jobs.claim_next().await.unwrap() {
        h.orchestrator.process(job).await.unwrap();
        observed.push(h.db.notes.fetch(note_id).await.unwrap().status);
    }

    assert_eq!(
        observed,
        vec![
            NoteStatus::Uploaded,
            NoteStatus::Transcribed,
            NoteStatus::EmbeddingPending,
            NoteStatus::Indexed,
        ]
    );
}

#[tokio::test]
async fn transient_failures_retry_then_succeed() {
    let h = harness_with(
        StoreConfig::default(),
        MockTranscriber::new("hello world").with_failures(vec![
            AdapterError::transient("connection reset"),
            AdapterError::transient("connection reset"),
        ]),
        MockAnalyzer::new("greeting", &["greeting"]),
        MockEmbedder::fixed(vec![1.0, 0.0, 0.0], MODEL_V1),
        MockNotifier::new(),
    );
    let owner = Uuid::new_v4();
    let note_id = h.service.upload_audio(owner, "audio/a.wav").await.unwrap();

    h.worker.drain().await.unwrap();

    let note = h.db.notes.fetch(note_id).await.unwrap();
    assert_eq!(note.status, NoteStatus::Indexed);
    // Two failed attempts were recorded for the transcribe stage.
    assert_eq!(note.retry_count, 2);
    assert_eq!(h.transcriber.calls(), 3);
}

#[tokio::test]
async fn permanent_failure_skips_retry_and_halts() {
    let h = harness_with(
        StoreConfig::default(),
        MockTranscriber::failing(AdapterError::permanent("unsupported audio codec")),
        MockAnalyzer::new("greeting", &["greeting"]),
        MockEmbedder::fixed(vec![1.0, 0.0, 0.0], MODEL_V1),
        MockNotifier::new(),
    );
    let owner = Uuid::new_v4();
    let note_id = h.service.upload_audio(owner, "audio/a.flv").await.unwrap();

    h.worker.drain().await.unwrap();

    let info = h.service.note_status(note_id).await.unwrap();
    assert_eq!(info.status, NoteStatus::FailedTranscribing);
    assert_eq!(info.error_kind, Some(ErrorKind::Permanent));
    assert_eq!(info.error_message.as_deref(), Some("unsupported audio codec"));

    // One call, no retry, no further job, nothing downstream.
    assert_eq!(h.transcriber.calls(), 1);
    assert_eq!(h.analyzer.calls(), 0);
    assert_eq!(h.embedder.calls(), 0);
    assert!(h.db.jobs.active_for_note(note_id).await.unwrap().is_none());
    assert!(h.notifier.deliveries().is_empty());
    assert!(h.index.is_empty());
}

#[tokio::test]
async fn retries_are_bounded_at_max_attempts() {
    let h = harness_with(
        StoreConfig::default().with_max_stage_attempts(3),
        MockTranscriber::failing(AdapterError::transient("rate limited")),
        MockAnalyzer::new("greeting", &["greeting"]),
        MockEmbedder::fixed(vec![1.0, 0.0, 0.0], MODEL_V1),
        MockNotifier::new(),
    );
    let owner = Uuid::new_v4();
    let note_id = h.service.upload_audio(owner, "audio/a.wav").await.unwrap();

    h.worker.drain().await.unwrap();

    let note = h.db.notes.fetch(note_id).await.unwrap();
    assert_eq!(note.status, NoteStatus::FailedTranscribing);
    assert_eq!(note.error_kind, Some(ErrorKind::Transient));
    // Exactly the configured number of attempts, never more.
    assert_eq!(h.transcriber.calls(), 3);
    assert!(h.db.jobs.active_for_note(note_id).await.unwrap().is_none());
}

#[tokio::test]
async fn failed_analysis_degrades_but_note_stays_searchable() {
    let h = harness_with(
        StoreConfig::default(),
        MockTranscriber::new("hello world"),
        MockAnalyzer::failing(AdapterError::permanent("model returned empty output")),
        MockEmbedder::fixed(vec![1.0, 0.0, 0.0], MODEL_V1),
        MockNotifier::new(),
    );
    let owner = Uuid::new_v4();
    let note_id = h.service.upload_audio(owner, "audio/a.wav").await.unwrap();

    h.worker.drain().await.unwrap();

    let note = h.db.notes.fetch(note_id).await.unwrap();
    assert_eq!(note.status, NoteStatus::Indexed);
    assert!(note.analysis_degraded);
    assert!(note.summary.is_none());
    assert!(note.error_kind.is_none());

    // Embedding still ran on the transcript alone.
    assert_eq!(h.embedder.calls(), 1);
    assert!(h.index.contains(note_id));
    // The notification falls back to the transcript.
    assert_eq!(
        h.notifier.deliveries(),
        vec![(note_id, "hello world".to_string())]
    );
}

#[tokio::test]
async fn exhausted_transient_analysis_also_degrades() {
    let h = harness_with(
        StoreConfig::default().with_max_stage_attempts(2),
        MockTranscriber::new("hello world"),
        MockAnalyzer::failing(AdapterError::transient("timeout")),
        MockEmbedder::fixed(vec![1.0, 0.0, 0.0], MODEL_V1),
        MockNotifier::new(),
    );
    let owner = Uuid::new_v4();
    let note_id = h.service.upload_audio(owner, "audio/a.wav").await.unwrap();

    h.worker.drain().await.unwrap();

    let note = h.db.notes.fetch(note_id).await.unwrap();
    assert_eq!(note.status, NoteStatus::Indexed);
    assert!(note.analysis_degraded);
    assert_eq!(h.analyzer.calls(), 2);
}

#[tokio::test]
async fn edit_reembeds_without_rerunning_earlier_stages() {
    let h = harness();
    let owner = Uuid::new_v4();
    let note_id = h.service.upload_audio(owner, "audio/a.wav").await.unwrap();
    h.worker.drain().await.unwrap();

    let edited = h
        .service
        .edit_note(
            note_id,
            EditNoteRequest {
                transcript: Some("hello world, revised".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(edited.status, NoteStatus::EmbeddingPending);
    assert!(edited.embedding_model_version.is_none());

    h.worker.drain().await.unwrap();

    let note = h.db.notes.fetch(note_id).await.unwrap();
    assert_eq!(note.status, NoteStatus::Indexed);
    assert_eq!(note.transcript.as_deref(), Some("hello world, revised"));

    // Transcription and analysis did not run again; embedding did.
    assert_eq!(h.transcriber.calls(), 1);
    assert_eq!(h.analyzer.calls(), 1);
    assert_eq!(h.embedder.calls(), 2);

    // Still exactly one record for the model version, and one notification ever.
    assert_eq!(h.db.embeddings.list_for_note(note_id).await.unwrap().len(), 1);
    assert_eq!(h.notifier.deliveries().len(), 1);
}

#[tokio::test]
async fn edit_is_rejected_while_pipeline_is_running() {
    let h = harness();
    let owner = Uuid::new_v4();
    let note_id = h.service.upload_audio(owner, "audio/a.wav").await.unwrap();

    let err = h
        .service
        .edit_note(
            note_id,
            EditNoteRequest {
                transcript: Some("too early".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
}

#[tokio::test]
async fn delete_with_inflight_job_leaves_no_trace() {
    let h = harness();
    let owner = Uuid::new_v4();
    let note_id = h.service.upload_audio(owner, "audio/a.wav").await.unwrap();

    // A worker has claimed the job when the owner deletes the note.
    let claimed = h.db.jobs.claim_next().await.unwrap().unwrap();
    h.service.delete_note(note_id).await.unwrap();

    let outcome = h.orchestrator.process(claimed).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Cancelled { note_id });

    assert!(matches!(
        h.db.notes.fetch(note_id).await.unwrap_err(),
        Error::NoteNotFound(_)
    ));
    assert!(h.db.embeddings.list_for_note(note_id).await.unwrap().is_empty());
    assert!(!h.index.contains(note_id));
    assert!(h.notifier.deliveries().is_empty());
}

#[tokio::test]
async fn delete_after_indexing_clears_the_index() {
    let h = harness();
    let owner = Uuid::new_v4();
    let note_id = h.service.upload_audio(owner, "audio/a.wav").await.unwrap();
    h.worker.drain().await.unwrap();
    assert!(h.index.contains(note_id));

    h.service.delete_note(note_id).await.unwrap();

    assert!(!h.index.contains(note_id));
    assert!(h.db.embeddings.list_for_note(note_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn uploads_are_rejected_under_backpressure() {
    let h = harness_with(
        StoreConfig::default().with_queue_limit(1),
        MockTranscriber::new("hello world"),
        MockAnalyzer::new("greeting", &["greeting"]),
        MockEmbedder::fixed(vec![1.0, 0.0, 0.0], MODEL_V1),
        MockNotifier::new(),
    );
    let owner = Uuid::new_v4();

    h.service.upload_audio(owner, "audio/a.wav").await.unwrap();
    let err = h
        .service
        .upload_audio(owner, "audio/b.wav")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Backpressure { .. }));

    // Once the queue drains, uploads are accepted again.
    h.worker.drain().await.unwrap();
    h.service.upload_audio(owner, "audio/b.wav").await.unwrap();
}

#[tokio::test]
async fn notifier_failure_never_blocks_the_pipeline() {
    let h = harness_with(
        StoreConfig::default(),
        MockTranscriber::new("hello world"),
        MockAnalyzer::new("greeting", &["greeting"]),
        MockEmbedder::fixed(vec![1.0, 0.0, 0.0], MODEL_V1),
        MockNotifier::failing(AdapterError::transient("webhook down")),
    );
    let owner = Uuid::new_v4();
    let note_id = h.service.upload_audio(owner, "audio/a.wav").await.unwrap();

    h.worker.drain().await.unwrap();

    let note = h.db.notes.fetch(note_id).await.unwrap();
    assert_eq!(note.status, NoteStatus::Indexed);
    // Best-effort: the failure is not retried and not stored on the note.
    assert!(note.error_kind.is_none());
}

#[tokio::test]
async fn model_upgrade_reembeds_and_supersedes() {
    let h = harness();
    let owner = Uuid::new_v4();
    let note_id = h.service.upload_audio(owner, "audio/a.wav").await.unwrap();
    h.worker.drain().await.unwrap();

    // Deploy a new embedding model over the same store and index.
    let embedder_v2 = Arc::new(MockEmbedder::fixed(vec![0.0, 1.0, 0.0], "mock-embed-v2"));
    let adapters = Arc::new(StaticAdapters::new(AdapterSet {
        transcriber: h.transcriber.clone(),
        analyzer: h.analyzer.clone(),
        embedder: embedder_v2.clone(),
        notifier: h.notifier.clone(),
    }));
    let orchestrator = Arc::new(Orchestrator::new(
        h.db.clone(),
        h.index.clone(),
        adapters,
        PipelineConfig::default().with_backoff(BackoffPolicy::none()),
    ));
    let worker = JobWorker::new(h.db.clone(), orchestrator, WorkerConfig::default());

    let queued = h.service.reembed_all("mock-embed-v2").await.unwrap();
    assert_eq!(queued, 1);
    worker.drain().await.unwrap();

    let note = h.db.notes.fetch(note_id).await.unwrap();
    assert_eq!(note.status, NoteStatus::Indexed);
    assert_eq!(note.embedding_model_version.as_deref(), Some("mock-embed-v2"));

    // Superseded, not merged: one record per model version, current wins.
    let records = h.db.embeddings.list_for_note(note_id).await.unwrap();
    assert_eq!(records.len(), 2);
    let current = h.db.embeddings.get_current(note_id).await.unwrap().unwrap();
    assert_eq!(current.model_version, "mock-embed-v2");
    assert_eq!(
        h.index.model_version_of(note_id).as_deref(),
        Some("mock-embed-v2")
    );

    // Re-embedding after the first indexing never re-notifies.
    assert_eq!(h.notifier.deliveries().len(), 1);
}
