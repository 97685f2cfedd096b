//! Workflow driver: the public entry point.
//!
//! The driver owns a record store and an orchestrator and exposes the
//! operations a caller (the CLI, a web layer) needs: register a document, run
//! or retry it, and read its record at any time. Expected failure kinds never
//! surface as errors here; a failed stage is visible as `status == failed`
//! on the returned record.

use crate::config::WorkflowConfig;
use crate::error::WorkflowError;
use crate::orchestrator::Orchestrator;
use crate::pipeline::executors::StageExecutors;
use crate::providers;
use crate::record::{AuditEntry, DocumentId, WorkflowRecord};
use crate::store::{JsonFileRecordStore, RecordStore};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct WorkflowDriver {
    store: Arc<dyn RecordStore>,
    orchestrator: Orchestrator,
    cancel: CancellationToken,
}

impl WorkflowDriver {
    /// Assemble a driver from explicit parts.
    pub fn new(store: Arc<dyn RecordStore>, executors: StageExecutors) -> Self {
        let orchestrator = Orchestrator::new(Arc::clone(&store), executors);
        Self {
            store,
            orchestrator,
            cancel: CancellationToken::new(),
        }
    }

    /// Apply the orchestrator settings of `config` (observer, step bound).
    pub fn configure(mut self, config: &WorkflowConfig) -> Self {
        self.orchestrator = self.orchestrator.with_max_steps(config.max_steps);
        if let Some(ref observer) = config.observer {
            self.orchestrator = self.orchestrator.with_observer(Arc::clone(observer));
        }
        self
    }

    /// Build the default stack: JSON record store under `config.data_dir`
    /// and the built-in providers.
    pub async fn from_config(config: &WorkflowConfig) -> Result<Self, WorkflowError> {
        let store = JsonFileRecordStore::open(&config.data_dir).await?;
        let executors = providers::default_executors(config)?;
        Ok(Self::new(Arc::new(store), executors).configure(config))
    }

    /// Token cancelling every run started by this driver. Runs stop before
    /// their next stage.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Register a document; the record starts in `uploaded`.
    pub async fn register(&self, source_path: &str) -> Result<WorkflowRecord, WorkflowError> {
        if source_path.trim().is_empty() {
            return Err(WorkflowError::InvalidConfig(
                "source path must not be empty".into(),
            ));
        }
        Ok(self.store.create(source_path).await?)
    }

    /// Current record, for polling.
    pub async fn status(&self, id: &DocumentId) -> Result<WorkflowRecord, WorkflowError> {
        Ok(self.store.get(id).await?)
    }

    pub async fn list(&self) -> Result<Vec<WorkflowRecord>, WorkflowError> {
        Ok(self.store.list().await?)
    }

    pub async fn audit(&self, id: &DocumentId) -> Result<Vec<AuditEntry>, WorkflowError> {
        Ok(self.store.audit(id).await?)
    }

    /// Run a document to `completed` or `failed`.
    pub async fn run_workflow(&self, id: &DocumentId) -> Result<WorkflowRecord, WorkflowError> {
        self.orchestrator.run_workflow(id, &self.cancel).await
    }

    /// Resume a failed document at the stage that failed.
    pub async fn retry(&self, id: &DocumentId) -> Result<WorkflowRecord, WorkflowError> {
        self.orchestrator.retry(id, &self.cancel).await
    }

    /// Register and run in one call.
    pub async fn process(&self, source_path: &str) -> Result<WorkflowRecord, WorkflowError> {
        let record = self.register(source_path).await?;
        self.run_workflow(&record.id).await
    }

    /// Run several documents concurrently, at most `concurrency` at a time.
    ///
    /// Results come back in completion order. One document's failure or
    /// conflict has no effect on the others.
    pub async fn run_many(
        &self,
        ids: Vec<DocumentId>,
        concurrency: usize,
    ) -> Vec<(DocumentId, Result<WorkflowRecord, WorkflowError>)> {
        info!("Running {} workflows (concurrency {})", ids.len(), concurrency);
        stream::iter(ids.into_iter().map(|id| async move {
            let result = self.run_workflow(&id).await;
            (id, result)
        }))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await
    }
}
