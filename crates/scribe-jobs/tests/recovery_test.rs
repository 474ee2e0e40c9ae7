//! Startup reconciliation tests: crash at any point, recover on restart.

mod common;

use uuid::Uuid;

use common::{harness, MODEL_V1};
use scribe_core::{NoteStatus, Transcript};
use scribe_jobs::recovery::reconcile;
use scribe_search::VectorIndex;

#[tokio::test]
async fn orphaned_running_job_is_reset_and_finished() {
    let h = harness();
    let owner = Uuid::new_v4();
    let note_id = h.service.upload_audio(owner, "audio/a.wav").await.unwrap();

    // A worker claimed the job, then the process died.
    h.db.jobs.claim_next().await.unwrap().unwrap();

    let report = reconcile(&h.db, &h.index, MODEL_V1).await.unwrap();
    assert_eq!(report.jobs_reset, 1);
    assert_eq!(report.reenqueued, 0);

    h.worker.drain().await.unwrap();
    let note = h.db.notes.fetch(note_id).await.unwrap();
    assert_eq!(note.status, NoteStatus::Indexed);
}

#[tokio::test]
async fn checkpoint_without_a_job_is_reenqueued() {
    let h = harness();
    let owner = Uuid::new_v4();
    let note_id = h.service.upload_audio(owner, "audio/a.wav").await.unwrap();

    // Crash after the transcript commit but before the next-stage enqueue:
    // the note rests at a checkpoint with no live job.
    let job = h.db.jobs.claim_next().await.unwrap().unwrap();
    h.db.notes
        .commit_transcript(job.id, note_id, &Transcript::new("hello world"))
        .await
        .unwrap();
    assert!(h.db.jobs.active_for_note(note_id).await.unwrap().is_none());

    let report = reconcile(&h.db, &h.index, MODEL_V1).await.unwrap();
    assert_eq!(report.reenqueued, 1);

    h.worker.drain().await.unwrap();
    let note = h.db.notes.fetch(note_id).await.unwrap();
    assert_eq!(note.status, NoteStatus::Indexed);
    // Transcription was not repeated.
    assert_eq!(h.transcriber.calls(), 0);
    assert_eq!(h.analyzer.calls(), 1);
}

#[tokio::test]
async fn verb_state_is_treated_as_pending_again() {
    let h = harness();
    let owner = Uuid::new_v4();
    let note_id = h.service.upload_audio(owner, "audio/a.wav").await.unwrap();

    // Crash mid-call: the note shows Transcribing and the job row is
    // still marked Running.
    let job = h.db.jobs.claim_next().await.unwrap().unwrap();
    h.db.notes.begin_stage(&job).await.unwrap();
    assert_eq!(
        h.db.notes.fetch(note_id).await.unwrap().status,
        NoteStatus::Transcribing
    );

    let report = reconcile(&h.db, &h.index, MODEL_V1).await.unwrap();
    // The running job is reset rather than duplicated.
    assert_eq!(report.jobs_reset, 1);
    assert_eq!(report.reenqueued, 0);

    h.worker.drain().await.unwrap();
    assert_eq!(
        h.db.notes.fetch(note_id).await.unwrap().status,
        NoteStatus::Indexed
    );
    // The adapter call runs again: at-least-once execution is tolerated.
    assert_eq!(h.transcriber.calls(), 1);
}

#[tokio::test]
async fn index_is_rebuilt_from_records_on_restart() {
    let h = harness();
    let owner = Uuid::new_v4();
    let note_id = h.service.upload_audio(owner, "audio/a.wav").await.unwrap();
    h.worker.drain().await.unwrap();

    // Restart: a fresh process starts with an empty in-process index.
    let fresh_index = VectorIndex::new();
    assert!(fresh_index.is_empty());

    let report = reconcile(&h.db, &fresh_index, MODEL_V1).await.unwrap();
    assert_eq!(report.index_entries, 1);
    assert!(fresh_index.contains(note_id));
    assert_eq!(report.jobs_reset, 0);
    assert_eq!(report.reenqueued, 0);
    assert_eq!(report.repaired, 0);
}

#[tokio::test]
async fn indexed_note_missing_its_record_gets_targeted_repair() {
    let h = harness();
    let owner = Uuid::new_v4();
    let note_id = h.service.upload_audio(owner, "audio/a.wav").await.unwrap();
    h.worker.drain().await.unwrap();

    // Simulate record loss (e.g. restored from an older backup).
    h.db.embeddings.delete_for_note(note_id).await.unwrap();

    let report = reconcile(&h.db, &h.index, MODEL_V1).await.unwrap();
    assert_eq!(report.index_entries, 0);
    assert_eq!(report.repaired, 1);

    // Only the embed stage re-runs; earlier stages are untouched.
    h.worker.drain().await.unwrap();
    let note = h.db.notes.fetch(note_id).await.unwrap();
    assert_eq!(note.status, NoteStatus::Indexed);
    assert!(h.db.embeddings.get_current(note_id).await.unwrap().is_some());
    assert!(h.index.contains(note_id));
    assert_eq!(h.transcriber.calls(), 1);
    assert_eq!(h.analyzer.calls(), 1);
    assert_eq!(h.embedder.calls(), 2);
}

#[tokio::test]
async fn reconcile_on_a_clean_store_is_a_no_op() {
    let h = harness();
    let report = reconcile(&h.db, &h.index, MODEL_V1).await.unwrap();
    assert_eq!(report, scribe_jobs::RecoveryReport::default());
}
