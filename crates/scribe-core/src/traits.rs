//! Core traits for the Scribe pipeline abstractions.
//!
//! These traits define the interfaces that concrete implementations must
//! satisfy, enabling pluggable backends (PostgreSQL or embedded store,
//! HTTP or mock adapters) and testability.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{AdapterError, Result};
use crate::models::*;

/// Result type for adapter calls; failures carry a transient/permanent
/// classification decided at the adapter boundary.
pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

// =============================================================================
// NOTE REPOSITORY
// =============================================================================

/// Repository for note state and the pipeline's transactional transitions.
///
/// Every `commit_*`/`record_stage_failure` call persists its full effect
/// (stage data, note status, job status) in one transaction, so a crash can
/// never separate "adapter call succeeded" from "state persisted". Each
/// commit first checks the job row: a `Cancelled` job makes the commit a
/// no-op that reports [`CommitOutcome::Cancelled`].
#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// Insert a new note in `Uploaded` status and enqueue its transcription
    /// job atomically. Rejects with [`crate::Error::Backpressure`] when the
    /// pending queue depth exceeds the configured limit.
    async fn create(&self, req: CreateNoteRequest) -> Result<Note>;

    /// Fetch a note by ID.
    async fn fetch(&self, id: Uuid) -> Result<Note>;

    /// Status + error view for the polling API.
    async fn status_info(&self, id: Uuid) -> Result<NoteStatusInfo>;

    /// Move the note into the job's verb status and reset the per-stage
    /// retry counter display. Returns the fresh note (the stage input).
    async fn begin_stage(&self, job: &Job) -> Result<Note>;

    /// Persist a transcript and advance to `Transcribed`.
    async fn commit_transcript(
        &self,
        job_id: Uuid,
        note_id: Uuid,
        transcript: &Transcript,
    ) -> Result<CommitOutcome>;

    /// Persist summary + tags and advance to `Analyzed`.
    async fn commit_analysis(
        &self,
        job_id: Uuid,
        note_id: Uuid,
        analysis: &Analysis,
    ) -> Result<CommitOutcome>;

    /// Persist the embedding record (superseding any record for the same
    /// model version), set the note's model version, advance to `Indexed`,
    /// and claim the one-shot notification flag. `first_index` in the
    /// outcome is true only when the flag was newly claimed.
    async fn commit_embedding(
        &self,
        job_id: Uuid,
        note_id: Uuid,
        output: &EmbeddingOutput,
    ) -> Result<CommitOutcome>;

    /// Record a stage failure atomically: either reschedule the job
    /// (`failure.retry_at` set) or apply the terminal action — move the note
    /// to `Failed*` or, for the degradable analysis stage, mark the analysis
    /// unavailable and leave the note at the `Analyzed` checkpoint.
    async fn record_stage_failure(
        &self,
        job_id: Uuid,
        note_id: Uuid,
        failure: &StageFailure,
    ) -> Result<FailureOutcome>;

    /// Apply an external edit. Only legal from a terminal status; a note
    /// with a non-terminal job reports a conflict. Overwrites the requested
    /// fields, clears the embedding model version, sets `EmbeddingPending`,
    /// and enqueues the embed job atomically.
    async fn apply_edit(&self, note_id: Uuid, req: EditNoteRequest) -> Result<Note>;

    /// Delete a note: cancels any live job, removes embedding records, and
    /// removes the note row, all before returning.
    async fn delete(&self, note_id: Uuid) -> Result<()>;

    /// Non-terminal notes (restart reconciliation input).
    async fn list_unfinished(&self) -> Result<Vec<Note>>;

    /// Indexed notes with no embedding record for the given model version
    /// (consistency repair input; also the re-embed candidates after a
    /// model upgrade).
    async fn list_indexed_without_record(&self, model_version: &str) -> Result<Vec<Uuid>>;
}

// =============================================================================
// JOB REPOSITORY
// =============================================================================

/// Repository for the durable job queue.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Enqueue a job for a stage. Enforces the at-most-one-non-terminal-job
    /// invariant per note (conflict otherwise). Enqueuing the embed stage
    /// also moves the note to `EmbeddingPending` in the same transaction.
    async fn enqueue(&self, note_id: Uuid, stage: Stage, priority: i32) -> Result<Job>;

    /// Claim the next due pending job (highest priority first, then earliest
    /// `next_attempt_at`), marking it `Running`.
    async fn claim_next(&self) -> Result<Option<Job>>;

    /// Get a job by ID.
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// All jobs recorded for a note, newest first.
    async fn get_for_note(&self, note_id: Uuid) -> Result<Vec<Job>>;

    /// The note's non-terminal job, if any.
    async fn active_for_note(&self, note_id: Uuid) -> Result<Option<Job>>;

    /// Count of pending jobs.
    async fn pending_count(&self) -> Result<i64>;

    /// Queue statistics.
    async fn queue_stats(&self) -> Result<QueueStats>;

    /// Reset every `Running` job back to `Pending`. Called once at startup:
    /// a running job can only have been orphaned by a crashed process.
    async fn reset_running(&self) -> Result<i64>;

    /// Remove old terminal jobs, keeping the most recent `keep_count`.
    async fn cleanup(&self, keep_count: i64) -> Result<i64>;
}

// =============================================================================
// EMBEDDING REPOSITORY
// =============================================================================

/// Repository for persisted embedding records (the record of truth the
/// vector index is rebuilt from).
#[async_trait]
pub trait EmbeddingRepository: Send + Sync {
    /// The most recent record for a note, if any.
    async fn get_current(&self, note_id: Uuid) -> Result<Option<EmbeddingRecord>>;

    /// All records for a note (across model versions).
    async fn list_for_note(&self, note_id: Uuid) -> Result<Vec<EmbeddingRecord>>;

    /// Seeds for rebuilding the vector index for one model version,
    /// restricted to live notes.
    async fn index_seeds(&self, model_version: &str) -> Result<Vec<IndexSeed>>;

    /// Delete all records for a note.
    async fn delete_for_note(&self, note_id: Uuid) -> Result<()>;
}

// =============================================================================
// CAPABILITY ADAPTERS
// =============================================================================

/// Speech-to-text over an opaque audio reference.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio_ref: &str) -> AdapterResult<Transcript>;

    /// Human-readable backend name.
    fn name(&self) -> &str;
}

/// Summary + tag extraction from a transcript.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, transcript: &str) -> AdapterResult<Analysis>;

    fn name(&self) -> &str;
}

/// Text embedding with a fixed dimension and a model version identifier.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> AdapterResult<EmbeddingOutput>;

    /// Expected dimension of produced vectors.
    fn dimension(&self) -> usize;

    /// Version identifier stored on embedding records; a change here
    /// supersedes existing records.
    fn model_version(&self) -> &str;
}

/// Completion notification. Best-effort: failures are logged and never roll
/// back pipeline state.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, note_id: Uuid, summary: &str) -> AdapterResult<()>;
}

/// Text generation, used by the retrieval-augmented answer path and the
/// LLM analyzer.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, system: &str, prompt: &str) -> AdapterResult<String>;

    fn name(&self) -> &str;
}

/// The immutable adapter bundle a job runs against.
#[derive(Clone)]
pub struct AdapterSet {
    pub transcriber: Arc<dyn Transcriber>,
    pub analyzer: Arc<dyn Analyzer>,
    pub embedder: Arc<dyn Embedder>,
    pub notifier: Arc<dyn Notifier>,
}

/// Resolves the adapter set for a job's owner once, before any call is made.
/// Per-owner model/endpoint choices become an explicit immutable value here
/// instead of ambient lookups mid-call.
pub trait AdapterResolver: Send + Sync {
    fn resolve(&self, owner_id: Uuid) -> Arc<AdapterSet>;
}

/// Resolver that serves one fixed adapter set to every owner.
pub struct StaticAdapters {
    set: Arc<AdapterSet>,
}

impl StaticAdapters {
    pub fn new(set: AdapterSet) -> Self {
        Self { set: Arc::new(set) }
    }
}

impl AdapterResolver for StaticAdapters {
    fn resolve(&self, _owner_id: Uuid) -> Arc<AdapterSet> {
        self.set.clone()
    }
}
