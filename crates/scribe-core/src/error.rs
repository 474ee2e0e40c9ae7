//! Error types for the Scribe pipeline.

use thiserror::Error;

/// Result type alias using Scribe's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of an adapter failure, decided at the adapter boundary.
///
/// The orchestrator never inspects transport errors directly; it only
/// consumes this classification when deciding whether to retry a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Expected to succeed on a later attempt (network, timeout, rate limit).
    Transient,
    /// Retrying will not help (malformed input, unsupported format, empty result).
    Permanent,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Permanent => "permanent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "transient" => Some(ErrorKind::Transient),
            "permanent" => Some(ErrorKind::Permanent),
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure from an external capability adapter.
#[derive(Error, Debug, Clone)]
#[error("{kind} adapter error: {message}")]
pub struct AdapterError {
    pub kind: ErrorKind,
    pub message: String,
}

impl AdapterError {
    /// A retryable failure.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            message: message.into(),
        }
    }

    /// A failure that will not succeed on retry.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Transient
    }

    /// Classify an HTTP status: 408/429/5xx are retryable, other client
    /// errors are not.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let message = format!("HTTP {}: {}", status, body.into());
        match status {
            408 | 429 => Self::transient(message),
            s if s >= 500 => Self::transient(message),
            _ => Self::permanent(message),
        }
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            return Self::transient(e.to_string());
        }
        if let Some(status) = e.status() {
            return Self::from_status(status.as_u16(), e.to_string());
        }
        if e.is_decode() {
            return Self::permanent(format!("invalid response body: {}", e));
        }
        Self::transient(e.to_string())
    }
}

/// Core error type for Scribe operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Note not found
    #[error("Note not found: {0}")]
    NoteNotFound(uuid::Uuid),

    /// Adapter call failed with classification
    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    /// Operation conflicts with an in-flight job for the same note
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Queue depth exceeded the configured limit; caller should retry later
    #[error("Queue is full ({pending} pending, limit {limit}); retry later")]
    Backpressure { pending: i64, limit: i64 },

    /// Query/stored vector dimensions do not match
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Embedding storage or lookup failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Search operation failed
    #[error("Search error: {0}")]
    Search(String),

    /// Job queue error
    #[error("Job error: {0}")]
    Job(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
