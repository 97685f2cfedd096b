//! Observer trait for per-stage workflow events.
//!
//! Inject an [`Arc<dyn WorkflowObserver>`] via
//! [`crate::config::WorkflowConfigBuilder::observer`] to receive events as
//! the orchestrator drives a document. Callers forward them to a progress
//! bar, a channel or a log; the library does not care.
//!
//! The record store remains the source of truth. Observers only see what the
//! orchestrator is doing right now and are never consulted for decisions.
//!
//! # Example
//!
//! ```rust
//! use edgequake_docflow::{Stage, WorkflowConfig, WorkflowObserver};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingObserver {
//!     completed: AtomicUsize,
//! }
//!
//! impl WorkflowObserver for CountingObserver {
//!     fn on_stage_complete(&self, id: &str, stage: Stage) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{id}: {stage} done");
//!     }
//! }
//!
//! let observer = Arc::new(CountingObserver { completed: AtomicUsize::new(0) });
//! let config = WorkflowConfig::builder()
//!     .observer(observer as Arc<dyn WorkflowObserver>)
//!     .build()
//!     .unwrap();
//! ```

use crate::pipeline::stage::Stage;
use crate::record::WorkflowStatus;
use std::sync::Arc;

/// Called by the orchestrator as it drives a document.
///
/// Implementations must be `Send + Sync`: several documents may run at once
/// (see [`crate::driver::WorkflowDriver::run_many`]) and call the same
/// observer concurrently. All methods default to no-ops.
pub trait WorkflowObserver: Send + Sync {
    /// A run started on a record at `status`.
    fn on_workflow_start(&self, id: &str, status: WorkflowStatus) {
        let _ = (id, status);
    }

    /// A stage executor is about to be invoked.
    fn on_stage_start(&self, id: &str, stage: Stage) {
        let _ = (id, stage);
    }

    /// A stage succeeded and its transition was committed.
    fn on_stage_complete(&self, id: &str, stage: Stage) {
        let _ = (id, stage);
    }

    /// A stage failed and the record was marked `failed`.
    fn on_stage_failed(&self, id: &str, stage: Stage, reason: &str) {
        let _ = (id, stage, reason);
    }

    /// The run ended at `status`. Emitted on every exit that followed
    /// `on_workflow_start`, errors included.
    fn on_workflow_finish(&self, id: &str, status: WorkflowStatus) {
        let _ = (id, status);
    }
}

/// Observer that ignores every event.
pub struct NoopObserver;

impl WorkflowObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::WorkflowConfig`].
pub type SharedObserver = Arc<dyn WorkflowObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingObserver {
        starts: AtomicUsize,
        completes: AtomicUsize,
        failures: AtomicUsize,
    }

    impl WorkflowObserver for TrackingObserver {
        fn on_stage_start(&self, _id: &str, _stage: Stage) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stage_complete(&self, _id: &str, _stage: Stage) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stage_failed(&self, _id: &str, _stage: Stage, _reason: &str) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let o = NoopObserver;
        o.on_workflow_start("d", WorkflowStatus::Uploaded);
        o.on_stage_start("d", Stage::Extract);
        o.on_stage_complete("d", Stage::Extract);
        o.on_stage_failed("d", Stage::Summarize, "boom");
        o.on_workflow_finish("d", WorkflowStatus::Failed);
    }

    #[test]
    fn tracking_observer_through_arc_dyn() {
        let tracker = Arc::new(TrackingObserver {
            starts: AtomicUsize::new(0),
            completes: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        });
        let shared: SharedObserver = tracker.clone();

        shared.on_stage_start("d", Stage::Extract);
        shared.on_stage_complete("d", Stage::Extract);
        shared.on_stage_start("d", Stage::Summarize);
        shared.on_stage_failed("d", Stage::Summarize, "rate limited");

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.failures.load(Ordering::SeqCst), 1);
    }
}
