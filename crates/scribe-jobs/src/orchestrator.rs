//! Pipeline orchestrator: advances a claimed job's note through its stage.
//!
//! Each stage runs one adapter call under an explicit timeout, then commits
//! the result (or records the classified failure) atomically through the
//! note repository. The orchestrator only consumes the adapter layer's
//! transient/permanent classification; it never inspects transport errors.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use scribe_core::{
    defaults, AdapterError, AdapterResult, AdapterResolver, AdapterSet, Analysis, CommitOutcome,
    EmbeddingOutput, Error, ExhaustAction, FailureOutcome, IndexSeed, Job, Note, Result, Stage,
    StageFailure, Transcript,
};
use scribe_db::Database;
use scribe_search::VectorIndex;

use crate::backoff::BackoffPolicy;

/// Orchestrator policy knobs, injected at construction.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub backoff: BackoffPolicy,
    /// Timeout for analysis and embedding calls.
    pub adapter_timeout: Duration,
    /// Timeout for transcription calls.
    pub transcribe_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            adapter_timeout: Duration::from_secs(defaults::ADAPTER_TIMEOUT_SECS),
            transcribe_timeout: Duration::from_secs(defaults::TRANSCRIBE_TIMEOUT_SECS),
        }
    }
}

impl PipelineConfig {
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_adapter_timeout(mut self, timeout: Duration) -> Self {
        self.adapter_timeout = timeout;
        self
    }
}

/// What happened to one processed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Stage committed; the next stage (if any) was enqueued.
    Completed { stage: Stage, note_id: Uuid },
    /// Transient failure; the job was rescheduled.
    Retried {
        stage: Stage,
        note_id: Uuid,
        attempt: i32,
    },
    /// Terminal failure; the note moved to its `Failed*` status.
    Failed { stage: Stage, note_id: Uuid },
    /// Analysis unavailable; the pipeline continued to embedding.
    Degraded { note_id: Uuid },
    /// The note was deleted mid-flight; the result was discarded.
    Cancelled { note_id: Uuid },
}

/// The note state machine. One instance is shared by all workers.
pub struct Orchestrator {
    db: Database,
    index: Arc<VectorIndex>,
    adapters: Arc<dyn AdapterResolver>,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(
        db: Database,
        index: Arc<VectorIndex>,
        adapters: Arc<dyn AdapterResolver>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            db,
            index,
            adapters,
            config,
        }
    }

    /// Process one claimed job to completion.
    #[instrument(skip(self, job), fields(job_id = %job.id, note_id = %job.note_id, stage = %job.stage))]
    pub async fn process(&self, job: Job) -> Result<ProcessOutcome> {
        let note = match self.db.notes.begin_stage(&job).await {
            Ok(note) => note,
            // Deleted between claim and start; deletion already cancelled the job.
            Err(Error::NoteNotFound(_)) => {
                debug!("Note vanished before stage start; discarding job");
                return Ok(ProcessOutcome::Cancelled {
                    note_id: job.note_id,
                });
            }
            Err(e) => return Err(e),
        };

        // Resolve the adapter set once per job, before any call is made.
        let adapters = self.adapters.resolve(note.owner_id);

        match job.stage {
            Stage::Transcribe => self.run_transcribe(&job, &note, &adapters).await,
            Stage::Analyze => self.run_analyze(&job, &note, &adapters).await,
            Stage::Embed => self.run_embed(&job, &note, &adapters).await,
        }
    }

    async fn run_transcribe(
        &self,
        job: &Job,
        note: &Note,
        adapters: &AdapterSet,
    ) -> Result<ProcessOutcome> {
        // A previous attempt may have died between the adapter call and the
        // commit; a populated transcript makes the call unnecessary.
        let existing = note.transcript.clone().filter(|t| !t.is_empty());
        let result = match existing {
            Some(text) => Ok(Transcript {
                text,
                language: note.language.clone(),
                duration_secs: note.duration_secs,
            }),
            None => {
                self.with_timeout(
                    self.config.transcribe_timeout,
                    adapters.transcriber.transcribe(&note.audio_ref),
                )
                .await
            }
        };

        match result {
            Ok(transcript) => {
                match self
                    .db
                    .notes
                    .commit_transcript(job.id, note.id, &transcript)
                    .await?
                {
                    CommitOutcome::Cancelled => self.discard(note.id),
                    CommitOutcome::Applied { .. } => {
                        self.enqueue_next(note.id, Stage::Analyze).await?;
                        Ok(ProcessOutcome::Completed {
                            stage: job.stage,
                            note_id: note.id,
                        })
                    }
                }
            }
            Err(e) => self.handle_failure(job, note.id, e).await,
        }
    }

    async fn run_analyze(
        &self,
        job: &Job,
        note: &Note,
        adapters: &AdapterSet,
    ) -> Result<ProcessOutcome> {
        let Some(transcript) = note.transcript.clone().filter(|t| !t.is_empty()) else {
            // Analysis cannot run without a transcript; degrade and move on.
            return self
                .handle_failure(
                    job,
                    note.id,
                    AdapterError::permanent("no transcript available for analysis"),
                )
                .await;
        };

        // Re-run after a crash: an already-committed summary dedupes the call.
        let result = match note.summary.clone().filter(|_| !note.analysis_degraded) {
            Some(summary) => Ok(Analysis {
                summary,
                tags: note.tags.clone(),
            }),
            None => {
                self.with_timeout(
                    self.config.adapter_timeout,
                    adapters.analyzer.analyze(&transcript),
                )
                .await
            }
        };

        match result {
            Ok(analysis) => {
                match self
                    .db
                    .notes
                    .commit_analysis(job.id, note.id, &analysis)
                    .await?
                {
                    CommitOutcome::Cancelled => self.discard(note.id),
                    CommitOutcome::Applied { .. } => {
                        self.enqueue_next(note.id, Stage::Embed).await?;
                        Ok(ProcessOutcome::Completed {
                            stage: job.stage,
                            note_id: note.id,
                        })
                    }
                }
            }
            Err(e) => self.handle_failure(job, note.id, e).await,
        }
    }

    async fn run_embed(
        &self,
        job: &Job,
        note: &Note,
        adapters: &AdapterSet,
    ) -> Result<ProcessOutcome> {
        let Some(transcript) = note.transcript.clone().filter(|t| !t.is_empty()) else {
            return self
                .handle_failure(
                    job,
                    note.id,
                    AdapterError::permanent("no transcript available to embed"),
                )
                .await;
        };

        // Notes stay searchable on the transcript alone when analysis is
        // degraded; embedding always derives from the transcript.
        let result: AdapterResult<EmbeddingOutput> = self
            .with_timeout(self.config.adapter_timeout, adapters.embedder.embed(&transcript))
            .await;

        match result {
            Ok(output) => {
                match self
                    .db
                    .notes
                    .commit_embedding(job.id, note.id, &output)
                    .await?
                {
                    CommitOutcome::Cancelled => {
                        // Drop any partial entry so the index never outlives
                        // the note.
                        self.index.remove(note.id);
                        self.discard(note.id)
                    }
                    CommitOutcome::Applied { first_index } => {
                        // Index write strictly after the record of truth.
                        self.index.upsert(IndexSeed {
                            note_id: note.id,
                            owner_id: note.owner_id,
                            vector: output.vector.clone(),
                            model_version: output.model_version.clone(),
                            updated_at: Utc::now(),
                        })?;

                        if first_index {
                            self.fire_notification(note, adapters).await;
                        }

                        info!(first_index, "Note indexed");
                        Ok(ProcessOutcome::Completed {
                            stage: job.stage,
                            note_id: note.id,
                        })
                    }
                }
            }
            Err(e) => self.handle_failure(job, note.id, e).await,
        }
    }

    /// Notification is best-effort and fires only on first entry into
    /// `Indexed`; failures are logged and never touch pipeline state.
    async fn fire_notification(&self, note: &Note, adapters: &AdapterSet) {
        let summary = note
            .summary
            .clone()
            .or_else(|| note.transcript.clone())
            .unwrap_or_else(|| "Note processed".to_string());
        if let Err(e) = adapters.notifier.notify(note.id, &summary).await {
            warn!(error = %e, "Completion notification failed");
        }
    }

    async fn enqueue_next(&self, note_id: Uuid, stage: Stage) -> Result<()> {
        match self
            .db
            .jobs
            .enqueue(note_id, stage, stage.default_priority())
            .await
        {
            Ok(_) => Ok(()),
            // Another job slipped in (e.g. concurrent delete/edit); the
            // reconciliation pass owns stragglers.
            Err(Error::Conflict(msg)) => {
                warn!(%note_id, %msg, "Skipped next-stage enqueue");
                Ok(())
            }
            Err(Error::NoteNotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn handle_failure(
        &self,
        job: &Job,
        note_id: Uuid,
        error: AdapterError,
    ) -> Result<ProcessOutcome> {
        let retryable = error.is_transient() && job.attempt + 1 < job.max_attempts;
        let retry_at = if retryable {
            let delay = self.config.backoff.delay(job.attempt);
            let delay = chrono::Duration::from_std(delay)
                .unwrap_or_else(|_| chrono::Duration::milliseconds(defaults::BACKOFF_MAX_MS as i64));
            Some(Utc::now() + delay)
        } else {
            None
        };

        let exhaust = match job.stage {
            // Analysis is optional enrichment: degrade, don't halt.
            Stage::Analyze => ExhaustAction::DegradeAndContinue,
            Stage::Transcribe | Stage::Embed => ExhaustAction::FailNote,
        };

        let failure = StageFailure {
            stage: job.stage,
            kind: error.kind,
            message: error.message,
            retry_at,
            exhaust,
        };
        match self
            .db
            .notes
            .record_stage_failure(job.id, note_id, &failure)
            .await?
        {
            FailureOutcome::Rescheduled { attempt, .. } => {
                debug!(attempt, "Stage rescheduled after transient failure");
                Ok(ProcessOutcome::Retried {
                    stage: job.stage,
                    note_id,
                    attempt,
                })
            }
            FailureOutcome::NoteFailed => {
                warn!(stage = %job.stage, "Stage failed terminally");
                Ok(ProcessOutcome::Failed {
                    stage: job.stage,
                    note_id,
                })
            }
            FailureOutcome::Degraded => {
                warn!("Analysis unavailable; continuing on transcript alone");
                self.enqueue_next(note_id, Stage::Embed).await?;
                Ok(ProcessOutcome::Degraded { note_id })
            }
            FailureOutcome::Cancelled => self.discard(note_id),
        }
    }

    fn discard(&self, note_id: Uuid) -> Result<ProcessOutcome> {
        debug!("Job cancelled; adapter result discarded");
        Ok(ProcessOutcome::Cancelled { note_id })
    }

    /// Wrap an adapter call in an explicit timeout; a timed-out call is
    /// abandoned and classified transient (its late result is ignored).
    async fn with_timeout<T>(
        &self,
        timeout: Duration,
        call: impl Future<Output = AdapterResult<T>>,
    ) -> AdapterResult<T> {
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::transient(format!(
                "adapter call timed out after {}s",
                timeout.as_secs()
            ))),
        }
    }
}
