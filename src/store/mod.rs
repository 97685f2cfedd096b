//! Durable keyed storage of workflow records.
//!
//! The store is the only shared mutable resource in the system. Every state
//! change goes through [`RecordStore::update`], which checks the caller's
//! expected pre-transition status and applies the field patch plus the new
//! status as one atomic write. Two concurrent runs on the same document
//! therefore cannot both commit the same stage: the second sees
//! [`StoreError::Conflict`] and aborts (first committer wins).
//!
//! No lock is held between a read and the later guarded update, so provider
//! calls in between never block other documents.

mod file;
mod memory;

pub use file::JsonFileRecordStore;
pub use memory::MemoryRecordStore;

use crate::error::StoreError;
use crate::record::{AuditEntry, DocumentId, Transition, WorkflowRecord};
use async_trait::async_trait;

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, id: &DocumentId) -> Result<WorkflowRecord, StoreError>;

    /// Register a new document in `uploaded` status under a fresh id.
    async fn create(&self, source_path: &str) -> Result<WorkflowRecord, StoreError>;

    /// Guarded single-stage write.
    ///
    /// Fails with [`StoreError::Conflict`] when the stored status is not
    /// `transition.expected`; nothing is written in that case.
    async fn update(
        &self,
        id: &DocumentId,
        transition: Transition,
    ) -> Result<WorkflowRecord, StoreError>;

    /// All records, oldest first.
    async fn list(&self) -> Result<Vec<WorkflowRecord>, StoreError>;

    /// Audit trail of one document, in write order.
    async fn audit(&self, id: &DocumentId) -> Result<Vec<AuditEntry>, StoreError>;
}

/// Shared guard check used by every implementation.
pub(crate) fn check_expected(
    record: &WorkflowRecord,
    transition: &Transition,
) -> Result<(), StoreError> {
    if record.status != transition.expected {
        return Err(StoreError::Conflict {
            id: record.id.clone(),
            expected: transition.expected,
            actual: record.status,
        });
    }
    Ok(())
}
