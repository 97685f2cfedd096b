//! Scripted capability adapters shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use edgequake_docflow::{
    BlobRef, CapabilityError, DocumentId, ImageGenerator, MemoryRecordStore, RecordStore,
    SpeechSynthesizer, Stage, StageExecutors, TextExtractor, TextSummarizer, WorkflowDriver,
    WorkflowObserver, WorkflowRecord, WorkflowStatus,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Barrier;
use tokio_util::sync::CancellationToken;

/// Extractor returning "Hello world" unless the source is scripted otherwise.
#[derive(Default)]
pub struct MockExtractor {
    pub calls: AtomicUsize,
    pub by_source: Mutex<HashMap<String, Result<String, CapabilityError>>>,
    /// When set, every call waits here before returning.
    pub barrier: Option<Arc<Barrier>>,
    /// When set, cancelled from inside the call.
    pub cancel_during: Mutex<Option<CancellationToken>>,
}

impl MockExtractor {
    pub fn script(&self, source: &str, result: Result<String, CapabilityError>) {
        self.by_source
            .lock()
            .unwrap()
            .insert(source.to_string(), result);
    }
}

#[async_trait]
impl TextExtractor for MockExtractor {
    async fn extract(&self, source_path: &str) -> Result<String, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ref barrier) = self.barrier {
            barrier.wait().await;
        }
        if let Some(token) = self.cancel_during.lock().unwrap().take() {
            token.cancel();
        }
        self.by_source
            .lock()
            .unwrap()
            .get(source_path)
            .cloned()
            .unwrap_or_else(|| Ok("Hello world".to_string()))
    }
}

/// Summarizer that pops scripted results, then appends a full stop.
#[derive(Default)]
pub struct MockSummarizer {
    pub calls: AtomicUsize,
    pub inputs: Mutex<Vec<String>>,
    pub script: Mutex<VecDeque<Result<String, CapabilityError>>>,
}

impl MockSummarizer {
    pub fn fail_next(&self, err: CapabilityError) {
        self.script.lock().unwrap().push_back(Err(err));
    }
}

#[async_trait]
impl TextSummarizer for MockSummarizer {
    async fn summarize(&self, text: &str) -> Result<String, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(text.to_string());
        match self.script.lock().unwrap().pop_front() {
            Some(scripted) => scripted,
            None => Ok(format!("{text}.")),
        }
    }
}

/// Synthesizer writing to `out/<id>.mp3`, optionally failing first.
#[derive(Default)]
pub struct MockSynthesizer {
    pub calls: AtomicUsize,
    pub script: Mutex<VecDeque<CapabilityError>>,
}

#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn synthesize(&self, id: &DocumentId, _text: &str) -> Result<BlobRef, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.script.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(BlobRef::new(format!("out/{id}.mp3")))
    }
}

/// Image generator writing to `out/<id>.png` and keeping the prompts it saw.
#[derive(Default)]
pub struct MockImageGenerator {
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl ImageGenerator for MockImageGenerator {
    async fn generate_image(
        &self,
        id: &DocumentId,
        prompt: &str,
    ) -> Result<BlobRef, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(BlobRef::new(format!("out/{id}.png")))
    }
}

/// The four mocks plus the store they run against.
pub struct Harness {
    pub store: Arc<MemoryRecordStore>,
    pub extractor: Arc<MockExtractor>,
    pub summarizer: Arc<MockSummarizer>,
    pub synthesizer: Arc<MockSynthesizer>,
    pub generator: Arc<MockImageGenerator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_extractor(MockExtractor::default())
    }

    pub fn with_extractor(extractor: MockExtractor) -> Self {
        Self {
            store: Arc::new(MemoryRecordStore::new()),
            extractor: Arc::new(extractor),
            summarizer: Arc::new(MockSummarizer::default()),
            synthesizer: Arc::new(MockSynthesizer::default()),
            generator: Arc::new(MockImageGenerator::default()),
        }
    }

    pub fn executors(&self) -> StageExecutors {
        StageExecutors::new(
            self.extractor.clone(),
            self.summarizer.clone(),
            self.synthesizer.clone(),
            self.generator.clone(),
        )
    }

    /// A fresh driver over the shared store and mocks.
    pub fn driver(&self) -> WorkflowDriver {
        let store: Arc<dyn RecordStore> = self.store.clone();
        WorkflowDriver::new(store, self.executors())
    }

    /// Seed a record with a fixed id.
    pub async fn seed(&self, id: &str, source: &str) -> WorkflowRecord {
        let mut record = WorkflowRecord::new(source);
        record.id = DocumentId::from(id);
        self.store.insert(record.clone()).await.unwrap();
        record
    }

    pub async fn seed_at(&self, record: WorkflowRecord) {
        self.store.insert(record).await.unwrap();
    }

    pub fn counts(&self) -> [usize; 4] {
        [
            self.extractor.calls.load(Ordering::SeqCst),
            self.summarizer.calls.load(Ordering::SeqCst),
            self.synthesizer.calls.load(Ordering::SeqCst),
            self.generator.calls.load(Ordering::SeqCst),
        ]
    }
}

/// Observer recording every event as a short string.
#[derive(Default)]
pub struct RecordingObserver {
    pub events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl WorkflowObserver for RecordingObserver {
    fn on_workflow_start(&self, _id: &str, status: WorkflowStatus) {
        self.push(format!("start:{status}"));
    }
    fn on_stage_start(&self, _id: &str, stage: Stage) {
        self.push(format!("begin:{stage}"));
    }
    fn on_stage_complete(&self, _id: &str, stage: Stage) {
        self.push(format!("done:{stage}"));
    }
    fn on_stage_failed(&self, _id: &str, stage: Stage, reason: &str) {
        self.push(format!("failed:{stage}:{reason}"));
    }
    fn on_workflow_finish(&self, _id: &str, status: WorkflowStatus) {
        self.push(format!("finish:{status}"));
    }
}
