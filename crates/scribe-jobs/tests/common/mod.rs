//! Shared test harness: embedded store, mock adapters, zero-delay backoff.
#![allow(dead_code)]

use std::sync::Arc;

use scribe_core::{AdapterSet, StaticAdapters};
use scribe_db::{Database, StoreConfig};
use scribe_inference::mock::{MockAnalyzer, MockEmbedder, MockNotifier, MockTranscriber};
use scribe_jobs::{
    BackoffPolicy, JobWorker, NoteService, Orchestrator, PipelineConfig, WorkerConfig,
};
use scribe_search::VectorIndex;

pub const MODEL_V1: &str = "mock-embed-v1";

pub struct Harness {
    pub db: Database,
    pub index: Arc<VectorIndex>,
    pub orchestrator: Arc<Orchestrator>,
    pub worker: JobWorker,
    pub service: NoteService,
    pub transcriber: Arc<MockTranscriber>,
    pub analyzer: Arc<MockAnalyzer>,
    pub embedder: Arc<MockEmbedder>,
    pub notifier: Arc<MockNotifier>,
}

pub fn harness_with(
    store: StoreConfig,
    transcriber: MockTranscriber,
    analyzer: MockAnalyzer,
    embedder: MockEmbedder,
    notifier: MockNotifier,
) -> Harness {
    let db = Database::in_memory(store);
    let index = Arc::new(VectorIndex::new());

    let transcriber = Arc::new(transcriber);
    let analyzer = Arc::new(analyzer);
    let embedder = Arc::new(embedder);
    let notifier = Arc::new(notifier);

    let adapters = Arc::new(StaticAdapters::new(AdapterSet {
        transcriber: transcriber.clone(),
        analyzer: analyzer.clone(),
        embedder: embedder.clone(),
        notifier: notifier.clone(),
    }));

    let orchestrator = Arc::new(Orchestrator::new(
        db.clone(),
        index.clone(),
        adapters,
        PipelineConfig::default().with_backoff(BackoffPolicy::none()),
    ));
    let worker = JobWorker::new(db.clone(), orchestrator.clone(), WorkerConfig::default());
    let service = NoteService::new(db.clone(), index.clone());

    Harness {
        db,
        index,
        orchestrator,
        worker,
        service,
        transcriber,
        analyzer,
        embedder,
        notifier,
    }
}

/// Happy-path harness: "hello world" transcript, "greeting" analysis, unit
/// vector embedding.
pub fn harness() -> Harness {
    harness_with(
        StoreConfig::default(),
        MockTranscriber::new("hello world"),
        MockAnalyzer::new("greeting", &["greeting"]),
        MockEmbedder::fixed(vec![1.0, 0.0, 0.0], MODEL_V1),
        MockNotifier::new(),
    )
}
