//! Job queue repository implementation for PostgreSQL.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use scribe_core::{
    Error, Job, JobRepository, JobStatus, NoteStatus, QueueStats, Result, Stage,
};

use crate::StoreConfig;

const JOB_COLUMNS: &str = "id, note_id, stage, status, priority, attempt, max_attempts, \
     next_attempt_at, error_message, created_at, started_at, completed_at";

/// PostgreSQL implementation of [`JobRepository`].
pub struct PgJobRepository {
    pool: Pool<Postgres>,
    config: StoreConfig,
}

impl PgJobRepository {
    pub fn new(pool: Pool<Postgres>, config: StoreConfig) -> Self {
        Self { pool, config }
    }

    fn job_from_row(row: &sqlx::postgres::PgRow) -> Result<Job> {
        let stage_str: String = row.get("stage");
        let stage = Stage::parse(&stage_str)
            .ok_or_else(|| Error::Internal(format!("unknown job stage: {stage_str}")))?;
        let status_str: String = row.get("status");
        let status = JobStatus::parse(&status_str)
            .ok_or_else(|| Error::Internal(format!("unknown job status: {status_str}")))?;

        Ok(Job {
            id: row.get("id"),
            note_id: row.get("note_id"),
            stage,
            status,
            priority: row.get("priority"),
            attempt: row.get("attempt"),
            max_attempts: row.get("max_attempts"),
            next_attempt_at: row.get("next_attempt_at"),
            error_message: row.get("error_message"),
            created_at: row.get("created_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
        })
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn enqueue(&self, note_id: Uuid, stage: Stage, priority: i32) -> Result<Job> {
        let now = Utc::now();
        let job_id = Uuid::new_v4();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Atomic check-and-insert so concurrent enqueues for the same note
        // cannot both pass the one-live-job invariant.
        let inserted = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO jobs (id, note_id, stage, status, priority, attempt, max_attempts,
                               next_attempt_at, created_at)
             SELECT $1, $2, $3, 'pending', $4, 0, $5, $6, $6
             WHERE NOT EXISTS (
                 SELECT 1 FROM jobs
                 WHERE note_id = $2 AND status IN ('pending', 'running')
             )
             RETURNING id",
        )
        .bind(job_id)
        .bind(note_id)
        .bind(stage.as_str())
        .bind(priority)
        .bind(self.config.max_stage_attempts)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?;

        if inserted.is_none() {
            return Err(Error::Conflict(format!(
                "note {note_id} already has a job in flight"
            )));
        }

        // Enqueuing the embed stage is the durable EmbeddingPending
        // checkpoint for the note.
        if stage == Stage::Embed {
            sqlx::query("UPDATE notes SET status = $1, updated_at = $2 WHERE id = $3")
                .bind(NoteStatus::EmbeddingPending.as_str())
                .bind(now)
                .bind(note_id)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;

        self.get(job_id)
            .await?
            .ok_or_else(|| Error::Job(format!("job {job_id} vanished after enqueue")))
    }

    async fn claim_next(&self) -> Result<Option<Job>> {
        let now = Utc::now();

        // FOR UPDATE SKIP LOCKED lets concurrent workers claim without
        // contending on the same row.
        let row = sqlx::query(&format!(
            "UPDATE jobs
             SET status = 'running', started_at = $1
             WHERE id = (
                 SELECT id FROM jobs
                 WHERE status = 'pending' AND next_attempt_at <= $1
                 ORDER BY priority DESC, next_attempt_at ASC, created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(Self::job_from_row).transpose()
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(Self::job_from_row).transpose()
    }

    async fn get_for_note(&self, note_id: Uuid) -> Result<Vec<Job>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE note_id = $1 ORDER BY created_at DESC"
        ))
        .bind(note_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::job_from_row).collect()
    }

    async fn active_for_note(&self, note_id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs
             WHERE note_id = $1 AND status IN ('pending', 'running')"
        ))
        .bind(note_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(Self::job_from_row).transpose()
    }

    async fn pending_count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status = 'pending'")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let row = sqlx::query(
            "SELECT
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'running') AS running,
                COUNT(*) FILTER (WHERE status = 'done') AS done,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                COUNT(*) FILTER (WHERE status = 'cancelled') AS cancelled,
                COUNT(*) AS total
             FROM jobs",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(QueueStats {
            pending: row.get("pending"),
            running: row.get("running"),
            done: row.get("done"),
            failed: row.get("failed"),
            cancelled: row.get("cancelled"),
            total: row.get("total"),
        })
    }

    async fn reset_running(&self) -> Result<i64> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'pending', started_at = NULL WHERE status = 'running'",
        )
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() as i64)
    }

    async fn cleanup(&self, keep_count: i64) -> Result<i64> {
        let result = sqlx::query(
            "DELETE FROM jobs
             WHERE status IN ('done', 'failed', 'cancelled')
               AND id NOT IN (
                   SELECT id FROM jobs
                   WHERE status IN ('done', 'failed', 'cancelled')
                   ORDER BY completed_at DESC NULLS LAST
                   LIMIT $1
               )",
        )
        .bind(keep_count)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() as i64)
    }
}
