//! In-process record store.

use super::{check_expected, RecordStore};
use crate::error::StoreError;
use crate::record::{AuditEntry, DocumentId, Transition, WorkflowRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Records held in memory. Used by tests and by callers that embed the
/// orchestrator and persist elsewhere.
#[derive(Default)]
pub struct MemoryRecordStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    records: HashMap<DocumentId, WorkflowRecord>,
    audit: Vec<AuditEntry>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record as-is, e.g. to seed a test at a mid-pipeline status.
    ///
    /// Refuses to replace an existing id.
    pub async fn insert(&self, record: WorkflowRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.records.get(&record.id) {
            return Err(StoreError::Conflict {
                id: record.id.clone(),
                expected: record.status,
                actual: existing.status,
            });
        }
        inner
            .audit
            .push(AuditEntry::system(&record.id, "insert", format!("seeded at {}", record.status)));
        inner.records.insert(record.id.clone(), record);
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, id: &DocumentId) -> Result<WorkflowRecord, StoreError> {
        self.inner
            .read()
            .await
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.clone() })
    }

    async fn create(&self, source_path: &str) -> Result<WorkflowRecord, StoreError> {
        let record = WorkflowRecord::new(source_path);
        let mut inner = self.inner.write().await;
        inner.audit.push(AuditEntry::system(
            &record.id,
            "insert",
            format!("Document {source_path} uploaded"),
        ));
        inner.records.insert(record.id.clone(), record.clone());
        debug!("Created record {} for {}", record.id, source_path);
        Ok(record)
    }

    async fn update(
        &self,
        id: &DocumentId,
        transition: Transition,
    ) -> Result<WorkflowRecord, StoreError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound { id: id.clone() })?;
        check_expected(record, &transition)?;

        record.apply(&transition);
        let updated = record.clone();
        inner
            .audit
            .push(AuditEntry::system(id, "update", transition.describe()));
        Ok(updated)
    }

    async fn list(&self) -> Result<Vec<WorkflowRecord>, StoreError> {
        let mut records: Vec<_> = self.inner.read().await.records.values().cloned().collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn audit(&self, id: &DocumentId) -> Result<Vec<AuditEntry>, StoreError> {
        let inner = self.inner.read().await;
        if !inner.records.contains_key(id) {
            return Err(StoreError::NotFound { id: id.clone() });
        }
        Ok(inner
            .audit
            .iter()
            .filter(|e| &e.document_id == id)
            .cloned()
            .collect())
    }
}
