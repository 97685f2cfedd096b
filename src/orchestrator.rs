//! The workflow state machine.
//!
//! ```text
//! uploaded ─▶ text_extracted ─▶ summarized ─▶ audio_generated ─▶ image_generated ─▶ completed
//!     │              │               │                │                  │
//!     └──────────────┴───────────────┴────────────────┴──────────────────┴─▶ failed
//!                                                                              │
//!                      retry: failed ─▶ input status of the failed stage ◀─────┘
//! ```
//!
//! Each loop iteration reads the record's status, picks the stage from the
//! transition table, runs its executor with no lock held, then commits the
//! outcome through the store's guarded update. The update's returned record
//! is the state the next iteration decides on.
//!
//! A stage failure is committed as `failed` and ends the run normally. A
//! guard conflict means another run got there first: nothing is written and
//! the run returns [`WorkflowError::Conflict`].

use crate::error::{StageError, StoreError, WorkflowError};
use crate::pipeline::executors::StageExecutors;
use crate::pipeline::stage::Stage;
use crate::progress::SharedObserver;
use crate::record::{
    DocumentId, FailureInfo, RecordPatch, Transition, WorkflowRecord, WorkflowStatus,
};
use crate::store::RecordStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct Orchestrator {
    store: Arc<dyn RecordStore>,
    executors: StageExecutors,
    observer: Option<SharedObserver>,
    max_steps: usize,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn RecordStore>, executors: StageExecutors) -> Self {
        Self {
            store,
            executors,
            observer: None,
            max_steps: 10,
        }
    }

    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Drive `id` until `completed`, `failed`, cancellation or a conflict.
    ///
    /// * `completed` records are returned unchanged.
    /// * `failed` records are returned unchanged: resuming one requires
    ///   [`Orchestrator::retry`].
    /// * Cancellation is checked before every stage. A stage already in
    ///   flight when cancellation arrives finishes and is committed; no
    ///   further stage starts.
    pub async fn run_workflow(
        &self,
        id: &DocumentId,
        cancel: &CancellationToken,
    ) -> Result<WorkflowRecord, WorkflowError> {
        let mut record = self.store.get(id).await?;
        info!("Workflow {}: starting at '{}'", id, record.status);
        self.notify(|o| o.on_workflow_start(id.as_str(), record.status));

        let result = self.drive(&mut record, cancel).await;

        // A conflict means the stored record moved past what this run holds.
        let last = match &result {
            Err(WorkflowError::Conflict { actual, .. }) => *actual,
            _ => record.status,
        };
        self.notify(|o| o.on_workflow_finish(id.as_str(), last));
        result.map(|()| record)
    }

    /// The stage loop of [`Orchestrator::run_workflow`]. `record` tracks the
    /// last committed state, whichever way the loop exits.
    async fn drive(
        &self,
        record: &mut WorkflowRecord,
        cancel: &CancellationToken,
    ) -> Result<(), WorkflowError> {
        let id = record.id.clone();
        let mut steps = 0usize;
        loop {
            if record.status.is_terminal() {
                if record.status == WorkflowStatus::Failed {
                    debug!(
                        "Workflow {}: failed ({}), waiting for explicit retry",
                        id,
                        record.failure_reason.as_deref().unwrap_or("no reason")
                    );
                }
                return Ok(());
            }

            let stage = Stage::for_status(record.status).ok_or_else(|| {
                WorkflowError::Internal(format!("no stage accepts status '{}'", record.status))
            })?;

            if cancel.is_cancelled() {
                info!("Workflow {}: cancelled before {}", id, stage);
                return Err(WorkflowError::Cancelled {
                    id,
                    status: record.status,
                });
            }

            if steps >= self.max_steps {
                return Err(WorkflowError::Internal(format!(
                    "workflow {id} exceeded {} steps at '{}'",
                    self.max_steps, record.status
                )));
            }
            steps += 1;

            *record = self.run_stage(record, stage).await?;
        }
    }

    /// Resume a `failed` record at the stage that failed, then run it.
    ///
    /// The reset (`failed → input status of the failed stage`) is itself a
    /// guarded write, so two concurrent retries cannot both resume. Records
    /// that are not `failed` are simply run.
    pub async fn retry(
        &self,
        id: &DocumentId,
        cancel: &CancellationToken,
    ) -> Result<WorkflowRecord, WorkflowError> {
        let record = self.store.get(id).await?;
        if record.status == WorkflowStatus::Failed {
            let stage = failed_stage_of(&record);
            info!(
                "Workflow {}: retrying {} (was: {})",
                id,
                stage,
                record.failure_reason.as_deref().unwrap_or("no reason")
            );
            self.store
                .update(
                    id,
                    Transition::new(
                        WorkflowStatus::Failed,
                        stage.input_status(),
                        RecordPatch::default(),
                    ),
                )
                .await?;
        }
        self.run_workflow(id, cancel).await
    }

    /// Execute one stage and commit its outcome.
    async fn run_stage(
        &self,
        record: &WorkflowRecord,
        stage: Stage,
    ) -> Result<WorkflowRecord, WorkflowError> {
        let id = &record.id;
        debug!("Workflow {}: running {}", id, stage);
        self.notify(|o| o.on_stage_start(id.as_str(), stage));

        let outcome = self.executors.for_stage(stage).run(record).await;

        let transition = match outcome {
            Ok(ref out) => Transition::new(stage.input_status(), out.next, out.patch.clone()),
            Err(ref err) => failure_transition(stage, err),
        };

        let committed = match self.store.update(id, transition).await {
            Ok(updated) => updated,
            Err(StoreError::Conflict {
                id,
                expected,
                actual,
            }) => {
                warn!(
                    "Workflow {}: {} result discarded, record already at '{}'",
                    id, stage, actual
                );
                return Err(WorkflowError::Conflict {
                    id,
                    expected,
                    actual,
                });
            }
            Err(e) => return Err(e.into()),
        };

        match outcome {
            Ok(_) => {
                info!("Workflow {}: {} → '{}'", id, stage, committed.status);
                self.notify(|o| o.on_stage_complete(id.as_str(), stage));
            }
            Err(err) => {
                warn!("Workflow {}: {} failed — {}", id, stage, err.reason);
                self.notify(|o| o.on_stage_failed(id.as_str(), stage, &err.reason));
            }
        }
        Ok(committed)
    }

    fn notify(&self, f: impl FnOnce(&SharedObserver)) {
        if let Some(ref observer) = self.observer {
            f(observer);
        }
    }
}

fn failure_transition(stage: Stage, err: &StageError) -> Transition {
    Transition::new(
        stage.input_status(),
        WorkflowStatus::Failed,
        RecordPatch::failure(FailureInfo {
            stage: err.stage,
            kind: err.kind,
            reason: err.reason.clone(),
        }),
    )
}

/// The stage a failed record should resume at.
///
/// Uses the recorded stage; records written without one fall back to the
/// first stage whose output is missing.
fn failed_stage_of(record: &WorkflowRecord) -> Stage {
    if let Some(stage) = record.failed_stage {
        return stage;
    }
    if record.extracted_text.is_none() {
        Stage::Extract
    } else if record.summary.is_none() {
        Stage::Summarize
    } else if record.audio_path.is_none() {
        Stage::Synthesize
    } else if record.image_path.is_none() {
        Stage::Illustrate
    } else {
        Stage::Finalize
    }
}
