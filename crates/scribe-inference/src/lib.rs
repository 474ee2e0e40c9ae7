//! # scribe-inference
//!
//! External AI capability adapters for the Scribe pipeline.
//!
//! This crate implements the adapter traits defined in `scribe-core`:
//! - [`OllamaBackend`]: embeddings and text generation over the Ollama API
//! - [`LlmAnalyzer`]: summary + tag extraction on top of a [`Generator`]
//! - [`WhisperTranscriber`]: OpenAI-compatible Whisper transcription server
//! - [`WebhookNotifier`]: completion notifications over a webhook
//! - [`mock`]: deterministic adapters for testing
//!
//! Every adapter classifies its failures as transient or permanent at this
//! boundary; raw transport errors never reach the orchestrator.

pub mod analyzer;
pub mod config;
pub mod mock;
pub mod notify;
pub mod ollama;
pub mod whisper;

pub use analyzer::LlmAnalyzer;
pub use config::InferenceConfig;
pub use notify::{NullNotifier, WebhookNotifier};
pub use ollama::OllamaBackend;
pub use whisper::WhisperTranscriber;

// Re-export the adapter traits alongside their implementations.
pub use scribe_core::{Analyzer, Embedder, Generator, Notifier, Transcriber};
