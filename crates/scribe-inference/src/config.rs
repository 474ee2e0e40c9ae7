//! Inference backend configuration.

use std::time::Duration;

use scribe_core::defaults;

/// Configuration for the HTTP inference backends.
///
/// Resolved once at startup (or once per owner by an `AdapterResolver`) and
/// passed into the backends as an immutable value.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Ollama API base URL.
    pub ollama_url: String,
    /// Generation model (analyzer, RAG answers).
    pub gen_model: String,
    /// Embedding model; also the stored `model_version`.
    pub embed_model: String,
    /// Expected embedding dimension.
    pub embed_dimension: usize,
    /// Whisper-compatible transcription server base URL.
    pub whisper_url: String,
    /// Whisper model name.
    pub whisper_model: String,
    /// Webhook for completion notifications; `None` disables them.
    pub notify_url: Option<String>,
    /// Bearer token for the notification webhook.
    pub notify_token: Option<String>,
    /// Timeout for generation and embedding calls.
    pub request_timeout: Duration,
    /// Timeout for transcription calls (long audio).
    pub transcribe_timeout: Duration,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            ollama_url: defaults::OLLAMA_URL.to_string(),
            gen_model: defaults::GEN_MODEL.to_string(),
            embed_model: defaults::EMBED_MODEL.to_string(),
            embed_dimension: defaults::EMBED_DIMENSION,
            whisper_url: defaults::DEFAULT_WHISPER_BASE_URL.to_string(),
            whisper_model: defaults::DEFAULT_WHISPER_MODEL.to_string(),
            notify_url: None,
            notify_token: None,
            request_timeout: Duration::from_secs(defaults::ADAPTER_TIMEOUT_SECS),
            transcribe_timeout: Duration::from_secs(defaults::TRANSCRIBE_TIMEOUT_SECS),
        }
    }
}

impl InferenceConfig {
    /// Build from environment variables, falling back to defaults.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `OLLAMA_URL` | `http://127.0.0.1:11434` |
    /// | `OLLAMA_GEN_MODEL` | `llama3` |
    /// | `OLLAMA_EMBED_MODEL` | `nomic-embed-text` |
    /// | `EMBED_DIMENSION` | `768` |
    /// | `WHISPER_BASE_URL` | `http://localhost:8000` |
    /// | `WHISPER_MODEL` | `large-v3` |
    /// | `NOTIFY_URL` | unset (disabled) |
    /// | `NOTIFY_TOKEN` | unset |
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            ollama_url: std::env::var("OLLAMA_URL").unwrap_or(base.ollama_url),
            gen_model: std::env::var("OLLAMA_GEN_MODEL").unwrap_or(base.gen_model),
            embed_model: std::env::var("OLLAMA_EMBED_MODEL").unwrap_or(base.embed_model),
            embed_dimension: std::env::var("EMBED_DIMENSION")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(base.embed_dimension),
            whisper_url: std::env::var(defaults::ENV_WHISPER_BASE_URL).unwrap_or(base.whisper_url),
            whisper_model: std::env::var(defaults::ENV_WHISPER_MODEL).unwrap_or(base.whisper_model),
            notify_url: std::env::var("NOTIFY_URL").ok().filter(|v| !v.is_empty()),
            notify_token: std::env::var("NOTIFY_TOKEN").ok().filter(|v| !v.is_empty()),
            request_timeout: base.request_timeout,
            transcribe_timeout: base.transcribe_timeout,
        }
    }

    pub fn with_ollama_url(mut self, url: impl Into<String>) -> Self {
        self.ollama_url = url.into();
        self
    }

    pub fn with_whisper_url(mut self, url: impl Into<String>) -> Self {
        self.whisper_url = url.into();
        self
    }

    pub fn with_embed_dimension(mut self, dimension: usize) -> Self {
        self.embed_dimension = dimension;
        self
    }
}
