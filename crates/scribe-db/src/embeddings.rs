//! Embedding record repository implementation for PostgreSQL.
//!
//! Records are written by the note repository's embed-stage commit; this
//! repository covers the read and cleanup paths (index rebuild, similar-note
//! lookup, deletion).

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use scribe_core::{EmbeddingRecord, EmbeddingRepository, Error, IndexSeed, Result};

/// PostgreSQL implementation of [`EmbeddingRepository`].
pub struct PgEmbeddingRepository {
    pool: Pool<Postgres>,
}

impl PgEmbeddingRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn record_from_row(row: &sqlx::postgres::PgRow) -> EmbeddingRecord {
        EmbeddingRecord {
            note_id: row.get("note_id"),
            vector: row.get::<Vector, _>("vector"),
            model_version: row.get("model_version"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl EmbeddingRepository for PgEmbeddingRepository {
    async fn get_current(&self, note_id: Uuid) -> Result<Option<EmbeddingRecord>> {
        let row = sqlx::query(
            "SELECT note_id, model_version, vector, created_at
             FROM embedding_records
             WHERE note_id = $1
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(note_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(Self::record_from_row))
    }

    async fn list_for_note(&self, note_id: Uuid) -> Result<Vec<EmbeddingRecord>> {
        let rows = sqlx::query(
            "SELECT note_id, model_version, vector, created_at
             FROM embedding_records
             WHERE note_id = $1
             ORDER BY created_at DESC",
        )
        .bind(note_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(Self::record_from_row).collect())
    }

    async fn index_seeds(&self, model_version: &str) -> Result<Vec<IndexSeed>> {
        let rows = sqlx::query(
            "SELECT r.note_id, n.owner_id, r.vector, r.model_version, n.updated_at
             FROM embedding_records r
             JOIN notes n ON n.id = r.note_id
             WHERE r.model_version = $1",
        )
        .bind(model_version)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .iter()
            .map(|row| IndexSeed {
                note_id: row.get("note_id"),
                owner_id: row.get("owner_id"),
                vector: row.get::<Vector, _>("vector"),
                model_version: row.get("model_version"),
                updated_at: row.get("updated_at"),
            })
            .collect())
    }

    async fn delete_for_note(&self, note_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM embedding_records WHERE note_id = $1")
            .bind(note_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }
}
