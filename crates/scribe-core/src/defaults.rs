//! Centralized default values for the Scribe pipeline.
//!
//! Every tunable lives here so behavior is discoverable in one place;
//! runtime configuration structs start from these and may override them.

// ─── Pipeline retry policy ─────────────────────────────────────────────────

/// Maximum attempts per stage before the note fails.
pub const MAX_STAGE_ATTEMPTS: i32 = 5;

/// Base delay for exponential backoff between attempts.
pub const BACKOFF_BASE_MS: u64 = 500;

/// Upper bound on a single backoff delay.
pub const BACKOFF_MAX_MS: u64 = 60_000;

/// Growth factor between consecutive attempts.
pub const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Fraction of the computed delay used as random jitter.
pub const BACKOFF_JITTER: f64 = 0.25;

// ─── Adapter timeouts ──────────────────────────────────────────────────────

/// Timeout for analysis and embedding calls.
pub const ADAPTER_TIMEOUT_SECS: u64 = 60;

/// Timeout for transcription calls (long audio).
pub const TRANSCRIBE_TIMEOUT_SECS: u64 = 300;

/// Timeout for notification webhooks.
pub const NOTIFY_TIMEOUT_SECS: u64 = 10;

// ─── Job scheduler ─────────────────────────────────────────────────────────

/// Worker pool size. Each worker may hold an adapter call open for seconds.
pub const WORKER_POOL_SIZE: usize = 4;

/// Polling interval when the queue is empty (milliseconds).
pub const JOB_POLL_INTERVAL_MS: u64 = 500;

/// Pending-queue depth above which upload-triggered jobs are rejected.
pub const QUEUE_BACKPRESSURE_LIMIT: i64 = 256;

/// Priority for maintenance jobs (bulk re-embed after a model upgrade).
pub const MAINTENANCE_PRIORITY: i32 = 1;

/// Terminal jobs kept when cleaning up the queue.
pub const JOB_CLEANUP_KEEP: i64 = 1_000;

// ─── Inference ─────────────────────────────────────────────────────────────

/// Default Ollama endpoint.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default generation model.
pub const GEN_MODEL: &str = "llama3";

/// Default embedding model.
pub const EMBED_MODEL: &str = "nomic-embed-text";

/// Default embedding dimension (nomic-embed-text).
pub const EMBED_DIMENSION: usize = 768;

/// Env var for the Whisper-compatible transcription server URL.
pub const ENV_WHISPER_BASE_URL: &str = "WHISPER_BASE_URL";

/// Default Whisper-compatible transcription server URL.
pub const DEFAULT_WHISPER_BASE_URL: &str = "http://localhost:8000";

/// Env var for the Whisper model name.
pub const ENV_WHISPER_MODEL: &str = "WHISPER_MODEL";

/// Default Whisper model.
pub const DEFAULT_WHISPER_MODEL: &str = "large-v3";

// ─── Search ────────────────────────────────────────────────────────────────

/// Default number of search results.
pub const SEARCH_TOP_K: usize = 10;

/// Default similar-notes result count.
pub const SIMILAR_LIMIT: usize = 4;

/// Notes retrieved as context for the retrieval-augmented answer path.
pub const RAG_CONTEXT_NOTES: usize = 5;

/// Characters of transcript used for a search snippet.
pub const SNIPPET_LENGTH: usize = 200;
