//! Error types for the edgequake-docflow library.
//!
//! Failures come at three levels:
//!
//! * [`CapabilityError`] — returned by a provider adapter. Either the input was
//!   unusable ([`CapabilityError::Input`]) or the provider itself failed
//!   ([`CapabilityError::Provider`], timeouts included).
//!
//! * [`StageError`] — **Non-fatal**: one stage of one document failed. The
//!   orchestrator persists it on the record as `failed` + reason and the run
//!   ends normally. It never escapes as an `Err`.
//!
//! * [`WorkflowError`] — **Run-level**: the run could not proceed or was
//!   deliberately aborted (unknown id, lost a concurrent race, cancelled,
//!   storage broken). Returned as `Err(WorkflowError)` from the driver.
//!
//! [`StoreError`] is what a [`crate::store::RecordStore`] returns; it converts
//! into [`WorkflowError`].

use crate::pipeline::stage::Stage;
use crate::record::{DocumentId, FailureKind, WorkflowStatus};
use std::path::PathBuf;
use thiserror::Error;

/// Run-level errors returned by the orchestrator and driver.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// No record exists for the id.
    #[error("Document '{id}' not found\nRegister it first with `docflow register <SOURCE>`.")]
    NotFound { id: DocumentId },

    /// Another run committed a transition for this record first.
    ///
    /// Nothing was written by this run; the caller may re-invoke.
    #[error("Document '{id}' was advanced concurrently (expected status '{expected}', found '{actual}')")]
    Conflict {
        id: DocumentId,
        expected: WorkflowStatus,
        actual: WorkflowStatus,
    },

    /// The run was cancelled between stages.
    #[error("Workflow for '{id}' cancelled at status '{status}'")]
    Cancelled { id: DocumentId, status: WorkflowStatus },

    /// The record store failed for a reason other than not-found or conflict.
    #[error("Record store error: {0}")]
    Storage(#[source] StoreError),

    /// A provider could not be constructed (missing API key, unknown name).
    #[error("Provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for WorkflowError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { id } => WorkflowError::NotFound { id },
            StoreError::Conflict {
                id,
                expected,
                actual,
            } => WorkflowError::Conflict {
                id,
                expected,
                actual,
            },
            other => WorkflowError::Storage(other),
        }
    }
}

/// Errors returned by [`crate::store::RecordStore`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record '{id}' not found")]
    NotFound { id: DocumentId },

    /// Optimistic-concurrency guard rejected the write.
    #[error("Record '{id}' is '{actual}', expected '{expected}'")]
    Conflict {
        id: DocumentId,
        expected: WorkflowStatus,
        actual: WorkflowStatus,
    },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A record file exists but does not parse.
    #[error("Record file '{path}' is corrupt: {detail}")]
    Corrupt { path: PathBuf, detail: String },
}

/// Error returned by a capability adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CapabilityError {
    /// Missing, empty, or unusable input.
    #[error("{0}")]
    Input(String),

    /// The provider failed or timed out.
    #[error("{0}")]
    Provider(String),
}

impl CapabilityError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CapabilityError::Input(_) => FailureKind::Input,
            CapabilityError::Provider(_) => FailureKind::Provider,
        }
    }

    pub fn into_reason(self) -> String {
        match self {
            CapabilityError::Input(r) | CapabilityError::Provider(r) => r,
        }
    }
}

/// A non-fatal failure of one stage.
///
/// The orchestrator turns it into a persisted `failed` status; all fields
/// produced by earlier stages are kept so a retry resumes at this stage.
#[derive(Debug, Clone, Error, PartialEq, serde::Serialize, serde::Deserialize)]
#[error("{stage} failed: {reason}")]
pub struct StageError {
    pub stage: Stage,
    pub kind: FailureKind,
    pub reason: String,
}

impl StageError {
    pub fn input(stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            kind: FailureKind::Input,
            reason: reason.into(),
        }
    }

    pub fn provider(stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            kind: FailureKind::Provider,
            reason: reason.into(),
        }
    }

    /// Attribute an adapter failure to `stage`.
    pub fn from_capability(stage: Stage, err: CapabilityError) -> Self {
        let kind = err.kind();
        let mut reason = err.into_reason();
        if reason.trim().is_empty() {
            reason = format!("{stage} failed without a reason");
        }
        Self {
            stage,
            kind,
            reason,
        }
    }
}
