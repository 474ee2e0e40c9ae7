//! Deterministic mock adapters for testing.
//!
//! Each mock returns a scripted result, optionally consuming a queue of
//! failures first, and logs call counts for assertions. Embeddings can be
//! fixed vectors or deterministic text hashes so similarity is reproducible.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use scribe_core::{
    AdapterError, AdapterResult, Analysis, Analyzer, Embedder, EmbeddingOutput, Generator,
    Notifier, Transcriber, Transcript, Vector,
};

/// Deterministic embedding from text content: same text, same vector.
pub fn hash_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let mut vec = vec![0.0f32; dimension];
    for (i, c) in text.chars().enumerate() {
        let idx = (c as usize + i) % dimension;
        vec[idx] += 0.1;
    }
    normalize(&mut vec);
    vec
}

fn normalize(vec: &mut [f32]) {
    let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        vec.iter_mut().for_each(|x| *x /= magnitude);
    }
}

struct FailureScript {
    queued: Mutex<VecDeque<AdapterError>>,
    forever: Option<AdapterError>,
    calls: AtomicUsize,
}

impl FailureScript {
    fn new() -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            forever: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn push(&self, err: AdapterError) {
        self.queued
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(err);
    }

    /// Count the call and pop the next scripted failure, if any.
    fn tick(&self) -> Option<AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.forever {
            return Some(err.clone());
        }
        self.queued
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

// =============================================================================
// TRANSCRIBER
// =============================================================================

pub struct MockTranscriber {
    transcript: Transcript,
    script: FailureScript,
}

impl MockTranscriber {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            transcript: Transcript::new(text),
            script: FailureScript::new(),
        }
    }

    /// Every call fails with this error.
    pub fn failing(err: AdapterError) -> Self {
        let mut mock = Self::new("");
        mock.script.forever = Some(err);
        mock
    }

    /// Queue failures returned before the scripted success.
    pub fn with_failures(self, errors: Vec<AdapterError>) -> Self {
        for err in errors {
            self.script.push(err);
        }
        self
    }

    pub fn calls(&self) -> usize {
        self.script.calls()
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _audio_ref: &str) -> AdapterResult<Transcript> {
        match self.script.tick() {
            Some(err) => Err(err),
            None => Ok(self.transcript.clone()),
        }
    }

    fn name(&self) -> &str {
        "mock-transcriber"
    }
}

// =============================================================================
// ANALYZER
// =============================================================================

pub struct MockAnalyzer {
    analysis: Analysis,
    script: FailureScript,
}

impl MockAnalyzer {
    pub fn new(summary: impl Into<String>, tags: &[&str]) -> Self {
        Self {
            analysis: Analysis {
                summary: summary.into(),
                tags: tags.iter().map(|t| t.to_string()).collect(),
            },
            script: FailureScript::new(),
        }
    }

    pub fn failing(err: AdapterError) -> Self {
        let mut mock = Self::new("", &[]);
        mock.script.forever = Some(err);
        mock
    }

    pub fn with_failures(self, errors: Vec<AdapterError>) -> Self {
        for err in errors {
            self.script.push(err);
        }
        self
    }

    pub fn calls(&self) -> usize {
        self.script.calls()
    }
}

#[async_trait]
impl Analyzer for MockAnalyzer {
    async fn analyze(&self, _transcript: &str) -> AdapterResult<Analysis> {
        match self.script.tick() {
            Some(err) => Err(err),
            None => Ok(self.analysis.clone()),
        }
    }

    fn name(&self) -> &str {
        "mock-analyzer"
    }
}

// =============================================================================
// EMBEDDER
// =============================================================================

enum EmbedMode {
    /// Always return this vector.
    Fixed(Vec<f32>),
    /// Deterministic hash of the input text.
    Hashing(usize),
}

pub struct MockEmbedder {
    mode: EmbedMode,
    model_version: String,
    script: FailureScript,
}

impl MockEmbedder {
    /// Embedder that returns `vector` for every input.
    pub fn fixed(vector: Vec<f32>, model_version: impl Into<String>) -> Self {
        Self {
            mode: EmbedMode::Fixed(vector),
            model_version: model_version.into(),
            script: FailureScript::new(),
        }
    }

    /// Embedder that hashes the input text into a unit vector, so distinct
    /// texts land at reproducible similarities.
    pub fn hashing(dimension: usize, model_version: impl Into<String>) -> Self {
        Self {
            mode: EmbedMode::Hashing(dimension),
            model_version: model_version.into(),
            script: FailureScript::new(),
        }
    }

    pub fn failing(err: AdapterError) -> Self {
        let mut mock = Self::fixed(vec![0.0], "mock-failing");
        mock.script.forever = Some(err);
        mock
    }

    pub fn with_failures(self, errors: Vec<AdapterError>) -> Self {
        for err in errors {
            self.script.push(err);
        }
        self
    }

    pub fn calls(&self) -> usize {
        self.script.calls()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> AdapterResult<EmbeddingOutput> {
        match self.script.tick() {
            Some(err) => Err(err),
            None => {
                let vector = match &self.mode {
                    EmbedMode::Fixed(v) => v.clone(),
                    EmbedMode::Hashing(dim) => hash_embedding(text, *dim),
                };
                Ok(EmbeddingOutput {
                    vector: Vector::from(vector),
                    model_version: self.model_version.clone(),
                })
            }
        }
    }

    fn dimension(&self) -> usize {
        match &self.mode {
            EmbedMode::Fixed(v) => v.len(),
            EmbedMode::Hashing(dim) => *dim,
        }
    }

    fn model_version(&self) -> &str {
        &self.model_version
    }
}

// =============================================================================
// NOTIFIER
// =============================================================================

#[derive(Default)]
pub struct MockNotifier {
    delivered: Mutex<Vec<(Uuid, String)>>,
    fail: Option<AdapterError>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(err: AdapterError) -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            fail: Some(err),
        }
    }

    pub fn deliveries(&self) -> Vec<(Uuid, String)> {
        self.delivered
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, note_id: Uuid, summary: &str) -> AdapterResult<()> {
        if let Some(err) = &self.fail {
            return Err(err.clone());
        }
        self.delivered
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((note_id, summary.to_string()));
        Ok(())
    }
}

// =============================================================================
// GENERATOR
// =============================================================================

pub struct MockGenerator {
    response: String,
    script: FailureScript,
}

impl MockGenerator {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            script: FailureScript::new(),
        }
    }

    pub fn calls(&self) -> usize {
        self.script.calls()
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(&self, _system: &str, _prompt: &str) -> AdapterResult<String> {
        match self.script.tick() {
            Some(err) => Err(err),
            None => Ok(self.response.clone()),
        }
    }

    fn name(&self) -> &str {
        "mock-generator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_embedding_deterministic() {
        let a = hash_embedding("quantum computing", 64);
        let b = hash_embedding("quantum computing", 64);
        let c = hash_embedding("grocery list", 64);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_hash_embedding_normalized() {
        let v = hash_embedding("some text", 32);
        let magnitude: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_transcriber_failures_then_success() {
        let transcriber = MockTranscriber::new("hello world").with_failures(vec![
            AdapterError::transient("timeout"),
            AdapterError::transient("timeout"),
        ]);

        assert!(transcriber.transcribe("ref").await.is_err());
        assert!(transcriber.transcribe("ref").await.is_err());
        let transcript = transcriber.transcribe("ref").await.unwrap();
        assert_eq!(transcript.text, "hello world");
        assert_eq!(transcriber.calls(), 3);
    }

    #[tokio::test]
    async fn test_transcriber_failing_forever() {
        let transcriber = MockTranscriber::failing(AdapterError::permanent("unsupported codec"));
        for _ in 0..3 {
            let err = transcriber.transcribe("ref").await.unwrap_err();
            assert!(!err.is_transient());
        }
        assert_eq!(transcriber.calls(), 3);
    }

    #[tokio::test]
    async fn test_embedder_fixed_vector() {
        let embedder = MockEmbedder::fixed(vec![1.0, 0.0, 0.0], "mock-v1");
        let output = embedder.embed("anything").await.unwrap();
        assert_eq!(output.vector.as_slice(), &[1.0, 0.0, 0.0]);
        assert_eq!(output.model_version, "mock-v1");
        assert_eq!(embedder.dimension(), 3);
    }

    #[tokio::test]
    async fn test_notifier_records_deliveries() {
        let notifier = MockNotifier::new();
        let id = Uuid::new_v4();
        notifier.notify(id, "greeting").await.unwrap();

        let deliveries = notifier.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0], (id, "greeting".to_string()));
    }
}
