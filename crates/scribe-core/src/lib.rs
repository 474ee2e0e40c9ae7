//! # scribe-core
//!
//! Core types, traits, and abstractions for the Scribe voice-note pipeline.
//!
//! This crate provides the foundational data structures and trait definitions
//! that other scribe crates depend on: the note state machine, the job queue
//! model, repository traits, and the adapter contracts for external AI
//! capabilities (transcription, analysis, embedding, notification).

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{AdapterError, Error, ErrorKind, Result};
pub use models::*;
pub use traits::*;
