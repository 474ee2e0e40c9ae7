//! # scribe-db
//!
//! Persistence layer for the Scribe note pipeline.
//!
//! This crate provides:
//! - Connection pool management
//! - PostgreSQL (+pgvector) repository implementations for notes, the
//!   durable job queue, and embedding records
//! - An embedded in-memory store implementing the same repository traits,
//!   used by tests and by single-process deployments without Postgres
//!
//! ## Example
//!
//! ```rust,ignore
//! use scribe_db::{Database, StoreConfig};
//! use scribe_core::CreateNoteRequest;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/scribe", StoreConfig::default()).await?;
//!
//!     let note = db.notes.create(CreateNoteRequest {
//!         owner_id: uuid::Uuid::new_v4(),
//!         audio_ref: "audio/greeting.wav".to_string(),
//!     }).await?;
//!
//!     println!("Created note: {}", note.id);
//!     Ok(())
//! }
//! ```

pub mod embeddings;
pub mod jobs;
pub mod memory;
pub mod notes;
pub mod pool;
pub mod schema;

use std::sync::Arc;

use scribe_core::{defaults, EmbeddingRepository, JobRepository, NoteRepository, Result};

// Re-export core types
pub use scribe_core::*;

pub use embeddings::PgEmbeddingRepository;
pub use jobs::PgJobRepository;
pub use memory::MemoryStore;
pub use notes::PgNoteRepository;
pub use pool::{create_pool, PoolConfig};

/// Store-level policy knobs shared by all backends.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum attempts per stage before a note fails.
    pub max_stage_attempts: i32,
    /// Pending-queue depth above which new uploads are rejected.
    pub queue_limit: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_stage_attempts: defaults::MAX_STAGE_ATTEMPTS,
            queue_limit: defaults::QUEUE_BACKPRESSURE_LIMIT,
        }
    }
}

impl StoreConfig {
    pub fn with_max_stage_attempts(mut self, attempts: i32) -> Self {
        self.max_stage_attempts = attempts.max(1);
        self
    }

    pub fn with_queue_limit(mut self, limit: i64) -> Self {
        self.queue_limit = limit;
        self
    }
}

/// Aggregated repository handles, cheap to clone and share.
#[derive(Clone)]
pub struct Database {
    pub notes: Arc<dyn NoteRepository>,
    pub jobs: Arc<dyn JobRepository>,
    pub embeddings: Arc<dyn EmbeddingRepository>,
}

impl Database {
    /// Connect to PostgreSQL, ensure the schema, and build the repositories.
    pub async fn connect(url: &str, config: StoreConfig) -> Result<Self> {
        let pool = pool::create_pool(url, PoolConfig::default()).await?;
        schema::ensure_schema(&pool).await?;
        Ok(Self {
            notes: Arc::new(PgNoteRepository::new(pool.clone(), config.clone())),
            jobs: Arc::new(PgJobRepository::new(pool.clone(), config)),
            embeddings: Arc::new(PgEmbeddingRepository::new(pool)),
        })
    }

    /// Build an embedded in-memory database. All repository handles share
    /// one store, so cross-entity commits stay atomic.
    pub fn in_memory(config: StoreConfig) -> Self {
        let store = MemoryStore::new(config);
        Self {
            notes: Arc::new(store.clone()),
            jobs: Arc::new(store.clone()),
            embeddings: Arc::new(store),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_config_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.max_stage_attempts, defaults::MAX_STAGE_ATTEMPTS);
        assert_eq!(config.queue_limit, defaults::QUEUE_BACKPRESSURE_LIMIT);
    }

    #[test]
    fn test_store_config_builder() {
        let config = StoreConfig::default()
            .with_max_stage_attempts(3)
            .with_queue_limit(10);
        assert_eq!(config.max_stage_attempts, 3);
        assert_eq!(config.queue_limit, 10);
    }

    #[test]
    fn test_store_config_attempts_floor() {
        let config = StoreConfig::default().with_max_stage_attempts(0);
        assert_eq!(config.max_stage_attempts, 1);
    }
}
