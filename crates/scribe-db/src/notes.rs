//! Note repository implementation for PostgreSQL.
//!
//! Stage commits update the note row, the job row, and (for the embed
//! stage) the embedding record inside a single transaction, so a crash can
//! never separate an adapter result from its recorded state transition.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row, Transaction};
use uuid::Uuid;

use scribe_core::{
    Analysis, CommitOutcome, CreateNoteRequest, EditNoteRequest, EmbeddingOutput, Error,
    ErrorKind, ExhaustAction, FailureOutcome, Job, JobStatus, Note, NoteRepository, NoteStatus,
    NoteStatusInfo, Result, Stage, StageFailure, Transcript,
};

use crate::StoreConfig;

const NOTE_COLUMNS: &str = "id, owner_id, status, audio_ref, transcript, summary, tags, \
     language, duration_secs, analysis_degraded, embedding_model_version, error_kind, \
     error_message, retry_count, notified_at, created_at, updated_at";

/// PostgreSQL implementation of [`NoteRepository`].
pub struct PgNoteRepository {
    pool: Pool<Postgres>,
    config: StoreConfig,
}

impl PgNoteRepository {
    pub fn new(pool: Pool<Postgres>, config: StoreConfig) -> Self {
        Self { pool, config }
    }

    fn note_from_row(row: &sqlx::postgres::PgRow) -> Result<Note> {
        let status_str: String = row.get("status");
        let status = NoteStatus::parse(&status_str)
            .ok_or_else(|| Error::Internal(format!("unknown note status: {status_str}")))?;
        let error_kind = row
            .get::<Option<String>, _>("error_kind")
            .as_deref()
            .and_then(ErrorKind::parse);

        Ok(Note {
            id: row.get("id"),
            owner_id: row.get("owner_id"),
            status,
            audio_ref: row.get("audio_ref"),
            transcript: row.get("transcript"),
            summary: row.get("summary"),
            tags: row.get("tags"),
            language: row.get("language"),
            duration_secs: row.get("duration_secs"),
            analysis_degraded: row.get("analysis_degraded"),
            embedding_model_version: row.get("embedding_model_version"),
            error_kind,
            error_message: row.get("error_message"),
            retry_count: row.get("retry_count"),
            notified_at: row.get("notified_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    /// Lock the job row and report its status, or `None` when the row is
    /// gone (note deleted concurrently).
    async fn lock_job(
        tx: &mut Transaction<'_, Postgres>,
        job_id: Uuid,
    ) -> Result<Option<JobStatus>> {
        let row = sqlx::query("SELECT status FROM jobs WHERE id = $1 FOR UPDATE")
            .bind(job_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)?;

        match row {
            None => Ok(None),
            Some(row) => {
                let status_str: String = row.get("status");
                let status = JobStatus::parse(&status_str)
                    .ok_or_else(|| Error::Internal(format!("unknown job status: {status_str}")))?;
                Ok(Some(status))
            }
        }
    }

    /// Shared preamble for stage commits: the job must still be `Running`;
    /// a cancelled or vanished job turns the commit into a discard.
    async fn commit_gate(
        tx: &mut Transaction<'_, Postgres>,
        job_id: Uuid,
    ) -> Result<Option<CommitOutcome>> {
        match Self::lock_job(tx, job_id).await? {
            None | Some(JobStatus::Cancelled) => Ok(Some(CommitOutcome::Cancelled)),
            Some(JobStatus::Running) => Ok(None),
            Some(other) => Err(Error::Job(format!(
                "cannot commit job {job_id} in status {other}"
            ))),
        }
    }

    async fn mark_job_done(tx: &mut Transaction<'_, Postgres>, job_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE jobs SET status = 'done', completed_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(job_id)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }
}

#[async_trait]
impl NoteRepository for PgNoteRepository {
    async fn create(&self, req: CreateNoteRequest) -> Result<Note> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let pending: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status = 'pending'")
            .fetch_one(&mut *tx)
            .await
            .map_err(Error::Database)?;
        if pending >= self.config.queue_limit {
            return Err(Error::Backpressure {
                pending,
                limit: self.config.queue_limit,
            });
        }

        let note_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO notes (id, owner_id, status, audio_ref, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $5)",
        )
        .bind(note_id)
        .bind(req.owner_id)
        .bind(NoteStatus::Uploaded.as_str())
        .bind(&req.audio_ref)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let stage = Stage::Transcribe;
        sqlx::query(
            "INSERT INTO jobs (id, note_id, stage, status, priority, attempt, max_attempts,
                               next_attempt_at, created_at)
             VALUES ($1, $2, $3, 'pending', $4, 0, $5, $6, $6)",
        )
        .bind(Uuid::new_v4())
        .bind(note_id)
        .bind(stage.as_str())
        .bind(stage.default_priority())
        .bind(self.config.max_stage_attempts)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        self.fetch(note_id).await
    }

    async fn fetch(&self, id: Uuid) -> Result<Note> {
        let row = sqlx::query(&format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        match row {
            Some(row) => Self::note_from_row(&row),
            None => Err(Error::NoteNotFound(id)),
        }
    }

    async fn status_info(&self, id: Uuid) -> Result<NoteStatusInfo> {
        let note = self.fetch(id).await?;
        Ok(NoteStatusInfo {
            note_id: note.id,
            status: note.status,
            error_kind: note.error_kind,
            error_message: note.error_message,
            retry_count: note.retry_count,
            analysis_degraded: note.analysis_degraded,
            updated_at: note.updated_at,
        })
    }

    async fn begin_stage(&self, job: &Job) -> Result<Note> {
        let row = sqlx::query(&format!(
            "UPDATE notes SET status = $1, retry_count = $2, updated_at = $3
             WHERE id = $4
             RETURNING {NOTE_COLUMNS}"
        ))
        .bind(job.stage.running_status().as_str())
        .bind(job.attempt)
        .bind(Utc::now())
        .bind(job.note_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(row) => Self::note_from_row(&row),
            None => Err(Error::NoteNotFound(job.note_id)),
        }
    }

    async fn commit_transcript(
        &self,
        job_id: Uuid,
        note_id: Uuid,
        transcript: &Transcript,
    ) -> Result<CommitOutcome> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        if let Some(outcome) = Self::commit_gate(&mut tx, job_id).await? {
            return Ok(outcome);
        }

        let updated = sqlx::query(
            "UPDATE notes
             SET transcript = $1, language = $2, duration_secs = $3, status = $4,
                 error_kind = NULL, error_message = NULL, updated_at = $5
             WHERE id = $6",
        )
        .bind(&transcript.text)
        .bind(&transcript.language)
        .bind(transcript.duration_secs)
        .bind(NoteStatus::Transcribed.as_str())
        .bind(Utc::now())
        .bind(note_id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;
        if updated.rows_affected() == 0 {
            return Ok(CommitOutcome::Cancelled);
        }

        Self::mark_job_done(&mut tx, job_id).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(CommitOutcome::Applied { first_index: false })
    }

    async fn commit_analysis(
        &self,
        job_id: Uuid,
        note_id: Uuid,
        analysis: &Analysis,
    ) -> Result<CommitOutcome> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        if let Some(outcome) = Self::commit_gate(&mut tx, job_id).await? {
            return Ok(outcome);
        }

        let updated = sqlx::query(
            "UPDATE notes
             SET summary = $1, tags = $2, analysis_degraded = FALSE, status = $3,
                 error_kind = NULL, error_message = NULL, updated_at = $4
             WHERE id = $5",
        )
        .bind(&analysis.summary)
        .bind(&analysis.tags)
        .bind(NoteStatus::Analyzed.as_str())
        .bind(Utc::now())
        .bind(note_id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;
        if updated.rows_affected() == 0 {
            return Ok(CommitOutcome::Cancelled);
        }

        Self::mark_job_done(&mut tx, job_id).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(CommitOutcome::Applied { first_index: false })
    }

    async fn commit_embedding(
        &self,
        job_id: Uuid,
        note_id: Uuid,
        output: &EmbeddingOutput,
    ) -> Result<CommitOutcome> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        if let Some(outcome) = Self::commit_gate(&mut tx, job_id).await? {
            return Ok(outcome);
        }

        let row = sqlx::query("SELECT notified_at FROM notes WHERE id = $1 FOR UPDATE")
            .bind(note_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(Error::Database)?;
        let Some(row) = row else {
            return Ok(CommitOutcome::Cancelled);
        };
        let first_index = row
            .get::<Option<chrono::DateTime<Utc>>, _>("notified_at")
            .is_none();

        // The record of truth is written first; the caller upserts the
        // vector index entry only after this transaction commits.
        sqlx::query(
            "INSERT INTO embedding_records (note_id, model_version, vector, created_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (note_id, model_version)
             DO UPDATE SET vector = EXCLUDED.vector, created_at = EXCLUDED.created_at",
        )
        .bind(note_id)
        .bind(&output.model_version)
        .bind(output.vector.clone())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        sqlx::query(
            "UPDATE notes
             SET embedding_model_version = $1, status = $2, error_kind = NULL,
                 error_message = NULL, notified_at = COALESCE(notified_at, $3), updated_at = $3
             WHERE id = $4",
        )
        .bind(&output.model_version)
        .bind(NoteStatus::Indexed.as_str())
        .bind(now)
        .bind(note_id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        Self::mark_job_done(&mut tx, job_id).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(CommitOutcome::Applied { first_index })
    }

    async fn record_stage_failure(
        &self,
        job_id: Uuid,
        note_id: Uuid,
        failure: &StageFailure,
    ) -> Result<FailureOutcome> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        match Self::lock_job(&mut tx, job_id).await? {
            None | Some(JobStatus::Cancelled) => return Ok(FailureOutcome::Cancelled),
            Some(JobStatus::Running) => {}
            Some(other) => {
                return Err(Error::Job(format!(
                    "cannot fail job {job_id} in status {other}"
                )))
            }
        }

        if let Some(retry_at) = failure.retry_at {
            let attempt: i32 = sqlx::query_scalar(
                "UPDATE jobs
                 SET status = 'pending', attempt = attempt + 1, next_attempt_at = $1,
                     error_message = $2, started_at = NULL
                 WHERE id = $3
                 RETURNING attempt",
            )
            .bind(retry_at)
            .bind(&failure.message)
            .bind(job_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(Error::Database)?;

            sqlx::query("UPDATE notes SET retry_count = $1, updated_at = $2 WHERE id = $3")
                .bind(attempt)
                .bind(now)
                .bind(note_id)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;

            tx.commit().await.map_err(Error::Database)?;
            return Ok(FailureOutcome::Rescheduled {
                attempt,
                next_attempt_at: retry_at,
            });
        }

        sqlx::query(
            "UPDATE jobs SET status = 'failed', completed_at = $1, error_message = $2
             WHERE id = $3",
        )
        .bind(now)
        .bind(&failure.message)
        .bind(job_id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let outcome = match failure.exhaust {
            ExhaustAction::DegradeAndContinue => {
                sqlx::query(
                    "UPDATE notes
                     SET analysis_degraded = TRUE, status = $1, updated_at = $2
                     WHERE id = $3",
                )
                .bind(NoteStatus::Analyzed.as_str())
                .bind(now)
                .bind(note_id)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
                FailureOutcome::Degraded
            }
            ExhaustAction::FailNote => {
                sqlx::query(
                    "UPDATE notes
                     SET status = $1, error_kind = $2, error_message = $3, updated_at = $4
                     WHERE id = $5",
                )
                .bind(failure.stage.failed_status().as_str())
                .bind(failure.kind.as_str())
                .bind(&failure.message)
                .bind(now)
                .bind(note_id)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
                FailureOutcome::NoteFailed
            }
        };

        tx.commit().await.map_err(Error::Database)?;
        Ok(outcome)
    }

    async fn apply_edit(&self, note_id: Uuid, req: EditNoteRequest) -> Result<Note> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let row = sqlx::query(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE id = $1 FOR UPDATE"
        ))
        .bind(note_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?;
        let Some(row) = row else {
            return Err(Error::NoteNotFound(note_id));
        };
        let note = Self::note_from_row(&row)?;

        let live_job: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs
             WHERE note_id = $1 AND status IN ('pending', 'running')",
        )
        .bind(note_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;
        if live_job > 0 {
            return Err(Error::Conflict(format!(
                "note {note_id} has a job in flight; retry once processing settles"
            )));
        }
        if !note.status.editable() {
            return Err(Error::Conflict(format!(
                "note {note_id} cannot be edited in status {}",
                note.status
            )));
        }

        let transcript = req.transcript.or(note.transcript);
        if transcript.as_deref().map_or(true, str::is_empty) {
            return Err(Error::InvalidInput(
                "edit would leave the note without a transcript".to_string(),
            ));
        }
        let summary = req.summary.or(note.summary);
        let tags = req.tags.unwrap_or(note.tags);
        let analysis_degraded = note.analysis_degraded && summary.is_none();

        sqlx::query(
            "UPDATE notes
             SET transcript = $1, summary = $2, tags = $3, analysis_degraded = $4,
                 embedding_model_version = NULL, status = $5, error_kind = NULL,
                 error_message = NULL, retry_count = 0, updated_at = $6
             WHERE id = $7",
        )
        .bind(&transcript)
        .bind(&summary)
        .bind(&tags)
        .bind(analysis_degraded)
        .bind(NoteStatus::EmbeddingPending.as_str())
        .bind(now)
        .bind(note_id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let stage = Stage::Embed;
        sqlx::query(
            "INSERT INTO jobs (id, note_id, stage, status, priority, attempt, max_attempts,
                               next_attempt_at, created_at)
             VALUES ($1, $2, $3, 'pending', $4, 0, $5, $6, $6)",
        )
        .bind(Uuid::new_v4())
        .bind(note_id)
        .bind(stage.as_str())
        .bind(stage.default_priority())
        .bind(self.config.max_stage_attempts)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        self.fetch(note_id).await
    }

    async fn delete(&self, note_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query(
            "UPDATE jobs SET status = 'cancelled', completed_at = $1
             WHERE note_id = $2 AND status IN ('pending', 'running')",
        )
        .bind(Utc::now())
        .bind(note_id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        // embedding_records go with the note via ON DELETE CASCADE.
        let deleted = sqlx::query("DELETE FROM notes WHERE id = $1")
            .bind(note_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        if deleted.rows_affected() == 0 {
            return Err(Error::NoteNotFound(note_id));
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn list_unfinished(&self) -> Result<Vec<Note>> {
        let rows = sqlx::query(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes
             WHERE status NOT IN ('indexed', 'failed_transcribing', 'failed_analyzing',
                                  'failed_embedding')
             ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::note_from_row).collect()
    }

    async fn list_indexed_without_record(&self, model_version: &str) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            "SELECT n.id FROM notes n
             WHERE n.status = 'indexed'
               AND NOT EXISTS (
                   SELECT 1 FROM embedding_records r
                   WHERE r.note_id = n.id AND r.model_version = $1
               )
             ORDER BY n.created_at ASC",
        )
        .bind(model_version)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(|row| row.get("id")).collect())
    }
}
