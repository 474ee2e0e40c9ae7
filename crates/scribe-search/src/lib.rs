//! # scribe-search
//!
//! Semantic search for Scribe notes.
//!
//! This crate provides:
//! - [`VectorIndex`]: an in-process nearest-neighbor index over note
//!   embeddings (one logical writer, many concurrent readers)
//! - [`SearchService`]: query embedding, owner-scoped ranked search,
//!   similar-note lookup, and the retrieval-augmented answer path

pub mod index;
pub mod service;

pub use index::{cosine_similarity, ScoredNote, VectorIndex};
pub use service::SearchService;

// Re-export core types
pub use scribe_core::{Answer, SearchHit};
