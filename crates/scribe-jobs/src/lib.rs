//! # scribe-jobs
//!
//! Durable job queue processing for the Scribe note pipeline.
//!
//! This crate provides:
//! - [`Orchestrator`]: the note state machine — runs one claimed job's
//!   adapter call and commits the transition
//! - [`JobWorker`]: a bounded worker pool with an explicit start/stop
//!   lifecycle and broadcast progress events
//! - [`NoteService`]: the externally visible operations (upload, edit,
//!   delete, status, maintenance re-embed)
//! - [`recovery`]: the startup reconciliation pass that rebuilds the vector
//!   index and re-enqueues work orphaned by a crash
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use scribe_db::{Database, StoreConfig};
//! use scribe_jobs::{JobWorker, NoteService, Orchestrator, PipelineConfig, WorkerConfig};
//! use scribe_search::VectorIndex;
//!
//! let db = Database::connect("postgres://...", StoreConfig::default()).await?;
//! let index = Arc::new(VectorIndex::new());
//! scribe_jobs::recovery::reconcile(&db, &index, embedder.model_version()).await?;
//!
//! let orchestrator = Arc::new(Orchestrator::new(db.clone(), index.clone(), adapters, PipelineConfig::default()));
//! let handle = JobWorker::new(db.clone(), orchestrator, WorkerConfig::default()).start();
//!
//! let service = NoteService::new(db, index);
//! let note_id = service.upload_audio(owner_id, "audio/voice.wav").await?;
//!
//! handle.shutdown().await?;
//! ```

pub mod backoff;
pub mod orchestrator;
pub mod recovery;
pub mod service;
pub mod worker;

// Re-export core types
pub use scribe_core::*;

pub use backoff::BackoffPolicy;
pub use orchestrator::{Orchestrator, PipelineConfig, ProcessOutcome};
pub use recovery::{reconcile, RecoveryReport};
pub use service::NoteService;
pub use worker::{JobWorker, WorkerConfig, WorkerEvent, WorkerHandle};

/// Capacity of the worker event broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 256;
