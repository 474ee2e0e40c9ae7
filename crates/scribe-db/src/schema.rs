//! Schema bootstrap for the Scribe tables.
//!
//! Statements are idempotent so `ensure_schema` can run at every startup.
//! The `vector` column is dimensionless: the dimension is fixed by the
//! embedding model in use and validated by the vector index, not the schema.

use sqlx::{Pool, Postgres};

use scribe_core::{Error, Result};

const STATEMENTS: &[&str] = &[
    "CREATE EXTENSION IF NOT EXISTS vector",
    "CREATE TABLE IF NOT EXISTS notes (
        id UUID PRIMARY KEY,
        owner_id UUID NOT NULL,
        status TEXT NOT NULL,
        audio_ref TEXT NOT NULL,
        transcript TEXT,
        summary TEXT,
        tags TEXT[] NOT NULL DEFAULT '{}',
        language TEXT,
        duration_secs DOUBLE PRECISION,
        analysis_degraded BOOLEAN NOT NULL DEFAULT FALSE,
        embedding_model_version TEXT,
        error_kind TEXT,
        error_message TEXT,
        retry_count INTEGER NOT NULL DEFAULT 0,
        notified_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS ix_notes_owner_status ON notes (owner_id, status)",
    "CREATE INDEX IF NOT EXISTS ix_notes_status ON notes (status)",
    "CREATE TABLE IF NOT EXISTS jobs (
        id UUID PRIMARY KEY,
        note_id UUID NOT NULL,
        stage TEXT NOT NULL,
        status TEXT NOT NULL,
        priority INTEGER NOT NULL,
        attempt INTEGER NOT NULL DEFAULT 0,
        max_attempts INTEGER NOT NULL,
        next_attempt_at TIMESTAMPTZ NOT NULL,
        error_message TEXT,
        created_at TIMESTAMPTZ NOT NULL,
        started_at TIMESTAMPTZ,
        completed_at TIMESTAMPTZ
    )",
    "CREATE INDEX IF NOT EXISTS ix_jobs_claim
        ON jobs (status, priority DESC, next_attempt_at ASC)",
    // Per-note serialization: at most one live job per note.
    "CREATE UNIQUE INDEX IF NOT EXISTS ux_jobs_note_active
        ON jobs (note_id) WHERE status IN ('pending', 'running')",
    "CREATE TABLE IF NOT EXISTS embedding_records (
        note_id UUID NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
        model_version TEXT NOT NULL,
        vector vector NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (note_id, model_version)
    )",
];

/// Create the Scribe tables and indexes if they do not exist yet.
pub async fn ensure_schema(pool: &Pool<Postgres>) -> Result<()> {
    for statement in STATEMENTS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(Error::Database)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_are_idempotent() {
        for statement in STATEMENTS {
            assert!(
                statement.contains("IF NOT EXISTS"),
                "schema statement must be idempotent: {statement}"
            );
        }
    }
}
