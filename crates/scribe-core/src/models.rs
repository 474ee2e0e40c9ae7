//! Data model for notes, jobs, and embeddings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorKind;

/// Embedding vector type (re-exported from pgvector).
pub use pgvector::Vector;

// =============================================================================
// NOTE STATE MACHINE
// =============================================================================

/// One discrete step of the note pipeline.
///
/// Stages run strictly in this order for a single note. Verb statuses
/// (`Transcribing`, `Analyzing`, `Embedding`) mean a stage's adapter call is
/// in flight; the matching checkpoint status is reached when the call's
/// result has been committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Audio reference -> transcript text.
    Transcribe,
    /// Transcript -> summary + tags.
    Analyze,
    /// Transcript -> embedding vector + index entry.
    Embed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Transcribe => "transcribe",
            Stage::Analyze => "analyze",
            Stage::Embed => "embed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "transcribe" => Some(Stage::Transcribe),
            "analyze" => Some(Stage::Analyze),
            "embed" => Some(Stage::Embed),
            _ => None,
        }
    }

    /// Status while this stage's adapter call is in flight.
    pub fn running_status(&self) -> NoteStatus {
        match self {
            Stage::Transcribe => NoteStatus::Transcribing,
            Stage::Analyze => NoteStatus::Analyzing,
            Stage::Embed => NoteStatus::Embedding,
        }
    }

    /// Durable checkpoint reached after this stage commits.
    pub fn checkpoint_status(&self) -> NoteStatus {
        match self {
            Stage::Transcribe => NoteStatus::Transcribed,
            Stage::Analyze => NoteStatus::Analyzed,
            Stage::Embed => NoteStatus::Indexed,
        }
    }

    /// Terminal status when this stage exhausts its retries.
    pub fn failed_status(&self) -> NoteStatus {
        match self {
            Stage::Transcribe => NoteStatus::FailedTranscribing,
            Stage::Analyze => NoteStatus::FailedAnalyzing,
            Stage::Embed => NoteStatus::FailedEmbedding,
        }
    }

    /// The stage that follows this one in the pipeline, if any.
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Transcribe => Some(Stage::Analyze),
            Stage::Analyze => Some(Stage::Embed),
            Stage::Embed => None,
        }
    }

    /// Default queue priority (higher = more urgent). First-time
    /// transcription is user-facing and outranks later enrichment stages;
    /// maintenance re-embeds use `defaults::MAINTENANCE_PRIORITY`.
    pub fn default_priority(&self) -> i32 {
        match self {
            Stage::Transcribe => 8,
            Stage::Analyze => 6,
            Stage::Embed => 5,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing status of a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteStatus {
    /// Created; transcription job enqueued.
    Uploaded,
    Transcribing,
    Transcribed,
    Analyzing,
    Analyzed,
    /// Embed job enqueued (initial run or re-embed after edit).
    EmbeddingPending,
    Embedding,
    /// Terminal success; the note is searchable.
    Indexed,
    FailedTranscribing,
    FailedAnalyzing,
    FailedEmbedding,
}

impl NoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteStatus::Uploaded => "uploaded",
            NoteStatus::Transcribing => "transcribing",
            NoteStatus::Transcribed => "transcribed",
            NoteStatus::Analyzing => "analyzing",
            NoteStatus::Analyzed => "analyzed",
            NoteStatus::EmbeddingPending => "embedding_pending",
            NoteStatus::Embedding => "embedding",
            NoteStatus::Indexed => "indexed",
            NoteStatus::FailedTranscribing => "failed_transcribing",
            NoteStatus::FailedAnalyzing => "failed_analyzing",
            NoteStatus::FailedEmbedding => "failed_embedding",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uploaded" => Some(NoteStatus::Uploaded),
            "transcribing" => Some(NoteStatus::Transcribing),
            "transcribed" => Some(NoteStatus::Transcribed),
            "analyzing" => Some(NoteStatus::Analyzing),
            "analyzed" => Some(NoteStatus::Analyzed),
            "embedding_pending" => Some(NoteStatus::EmbeddingPending),
            "embedding" => Some(NoteStatus::Embedding),
            "indexed" => Some(NoteStatus::Indexed),
            "failed_transcribing" => Some(NoteStatus::FailedTranscribing),
            "failed_analyzing" => Some(NoteStatus::FailedAnalyzing),
            "failed_embedding" => Some(NoteStatus::FailedEmbedding),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            NoteStatus::FailedTranscribing
                | NoteStatus::FailedAnalyzing
                | NoteStatus::FailedEmbedding
        )
    }

    pub fn is_terminal(&self) -> bool {
        *self == NoteStatus::Indexed || self.is_failed()
    }

    /// Whether an edit may be applied in this status. Edits are only
    /// accepted once the pipeline is at rest (terminal success or failure).
    pub fn editable(&self) -> bool {
        self.is_terminal()
    }

    /// The stage whose adapter call this verb status represents.
    pub fn running_stage(&self) -> Option<Stage> {
        match self {
            NoteStatus::Transcribing => Some(Stage::Transcribe),
            NoteStatus::Analyzing => Some(Stage::Analyze),
            NoteStatus::Embedding => Some(Stage::Embed),
            _ => None,
        }
    }

    /// The stage that must run (or re-run) to move a non-terminal note
    /// forward. Used by the startup reconciliation pass when a note has no
    /// live job.
    pub fn pending_stage(&self) -> Option<Stage> {
        match self {
            NoteStatus::Uploaded | NoteStatus::Transcribing => Some(Stage::Transcribe),
            NoteStatus::Transcribed | NoteStatus::Analyzing => Some(Stage::Analyze),
            NoteStatus::Analyzed | NoteStatus::EmbeddingPending | NoteStatus::Embedding => {
                Some(Stage::Embed)
            }
            NoteStatus::Indexed
            | NoteStatus::FailedTranscribing
            | NoteStatus::FailedAnalyzing
            | NoteStatus::FailedEmbedding => None,
        }
    }
}

impl std::fmt::Display for NoteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// NOTE TYPES
// =============================================================================

/// A voice note with its transcript and AI-generated enrichments.
///
/// Written exclusively by orchestrator-driven transitions; read by the
/// search service and the status API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub status: NoteStatus,
    /// Opaque handle to the stored audio (path, object key, ...).
    pub audio_ref: String,
    pub transcript: Option<String>,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    /// Detected language (ISO 639-1), from transcription.
    pub language: Option<String>,
    /// Audio duration in seconds, from transcription.
    pub duration_secs: Option<f64>,
    /// Analysis failed terminally but the pipeline continued on the
    /// transcript alone.
    pub analysis_degraded: bool,
    pub embedding_model_version: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    /// Attempts used by the current stage.
    pub retry_count: i32,
    /// Set on first entry into `Indexed`; guards the one-shot notification.
    pub notified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Status view returned by `note_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteStatusInfo {
    pub note_id: Uuid,
    pub status: NoteStatus,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub analysis_degraded: bool,
    pub updated_at: DateTime<Utc>,
}

/// Request for creating a new note from an upload.
#[derive(Debug, Clone)]
pub struct CreateNoteRequest {
    pub owner_id: Uuid,
    pub audio_ref: String,
}

/// Fields an external edit may overwrite. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct EditNoteRequest {
    pub transcript: Option<String>,
    pub summary: Option<String>,
    pub tags: Option<Vec<String>>,
}

// =============================================================================
// ADAPTER PAYLOADS
// =============================================================================

/// Result of audio transcription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transcript {
    pub text: String,
    /// Detected language (ISO 639-1 code).
    pub language: Option<String>,
    /// Total audio duration in seconds.
    pub duration_secs: Option<f64>,
}

impl Transcript {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: None,
            duration_secs: None,
        }
    }
}

/// Result of transcript analysis: a short summary plus a tag set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Analysis {
    pub summary: String,
    pub tags: Vec<String>,
}

/// Result of embedding generation.
#[derive(Debug, Clone)]
pub struct EmbeddingOutput {
    pub vector: Vector,
    pub model_version: String,
}

// =============================================================================
// EMBEDDING TYPES
// =============================================================================

/// A durably persisted embedding for a note. At most one record exists per
/// `(note_id, model_version)`; a model upgrade supersedes, never merges.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub note_id: Uuid,
    pub vector: Vector,
    pub model_version: String,
    pub created_at: DateTime<Utc>,
}

/// Everything the vector index needs to (re)build one entry.
#[derive(Debug, Clone)]
pub struct IndexSeed {
    pub note_id: Uuid,
    pub owner_id: Uuid,
    pub vector: Vector,
    pub model_version: String,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// SEARCH TYPES
// =============================================================================

/// A ranked search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub note_id: Uuid,
    pub score: f32,
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Answer produced by the retrieval-augmented generation path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    /// Notes whose content grounded the answer.
    pub cited_note_ids: Vec<Uuid>,
}

// =============================================================================
// JOB TYPES
// =============================================================================

/// Status of a job in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Cancelled,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "done" => Some(JobStatus::Done),
            "cancelled" => Some(JobStatus::Cancelled),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Cancelled | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of pipeline work for a single note stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub note_id: Uuid,
    pub stage: Stage,
    pub status: JobStatus,
    pub priority: i32,
    /// Attempts already consumed for this stage.
    pub attempt: i32,
    pub max_attempts: i32,
    /// Earliest time this job may be claimed.
    pub next_attempt_at: DateTime<Utc>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Queue statistics summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub running: i64,
    pub done: i64,
    pub failed: i64,
    pub cancelled: i64,
    pub total: i64,
}

// =============================================================================
// TRANSITION OUTCOMES
// =============================================================================

/// Outcome of committing a stage result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Result persisted and status advanced. `first_index` is true only for
    /// the embed stage's very first entry into `Indexed` for this note.
    Applied { first_index: bool },
    /// The job was cancelled (note deleted mid-flight); the result was
    /// discarded and nothing was persisted.
    Cancelled,
}

impl CommitOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, CommitOutcome::Applied { .. })
    }
}

/// How a terminal stage failure is reflected on the note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustAction {
    /// Move the note to the stage's `Failed*` status.
    FailNote,
    /// Optional-enrichment stage: mark the analysis degraded and let the
    /// pipeline continue to embedding on the transcript alone.
    DegradeAndContinue,
}

/// A classified stage failure, ready to be recorded atomically.
#[derive(Debug, Clone)]
pub struct StageFailure {
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
    /// `Some` reschedules the job at that time; `None` means the failure is
    /// terminal for this stage.
    pub retry_at: Option<DateTime<Utc>>,
    pub exhaust: ExhaustAction,
}

/// Outcome of recording a stage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Job rescheduled for another attempt.
    Rescheduled {
        attempt: i32,
        next_attempt_at: DateTime<Utc>,
    },
    /// Note moved to the stage's terminal failure status.
    NoteFailed,
    /// Analysis marked unavailable; pipeline continues to embedding.
    Degraded,
    /// The job had been cancelled; nothing recorded.
    Cancelled,
}
