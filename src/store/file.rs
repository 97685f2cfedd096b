//! JSON-file record store.
//!
//! ## Layout
//!
//! ```text
//! <root>/
//!  ├─ records/<id>.json   one pretty-printed WorkflowRecord per document
//!  ├─ audit.jsonl         append-only audit trail, one AuditEntry per line
//!  └─ store.lock          exclusive OS file lock around every write
//! ```
//!
//! Each record write goes to `<id>.json.tmp` first and is then renamed over
//! the live file, so a crash mid-write leaves the previous version intact.
//!
//! The read-check-write of [`RecordStore::update`] and the id allocation of
//! [`RecordStore::create`] run under an exclusive lock on `store.lock`, so
//! several stores (or processes) over one root still see first-committer-wins.
//! The OS drops the lock when its holder exits. An async mutex queues writers
//! of the same instance before they reach the file lock.
//!
//! The audit line is appended after the record is durable. A failed append is
//! logged and does not undo or fail the write.

use super::{check_expected, RecordStore};
use crate::error::StoreError;
use crate::record::{AuditEntry, DocumentId, Transition, WorkflowRecord};
use async_trait::async_trait;
use std::fs::File;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub struct JsonFileRecordStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileRecordStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        let records = root.join("records");
        tokio::fs::create_dir_all(&records)
            .await
            .map_err(|e| io_err(&records, e))?;
        info!("Record store at {}", root.display());
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, id: &DocumentId) -> Result<PathBuf, StoreError> {
        // Ids become file names; anything outside this alphabet cannot have
        // been issued by `create`.
        let valid = !id.as_str().is_empty()
            && id
                .as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::NotFound { id: id.clone() });
        }
        Ok(self.root.join("records").join(format!("{id}.json")))
    }

    fn audit_path(&self) -> PathBuf {
        self.root.join("audit.jsonl")
    }

    /// Block until this process holds the store-wide exclusive lock.
    ///
    /// The lock lives as long as the returned file handle.
    async fn lock_store(&self) -> Result<File, StoreError> {
        let path = self.root.join("store.lock");
        let lock_path = path.clone();
        let locked = tokio::task::spawn_blocking(move || {
            let file = std::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&lock_path)?;
            file.lock()?;
            Ok::<_, std::io::Error>(file)
        })
        .await
        .map_err(|e| io_err(&path, std::io::Error::other(e)))?;
        locked.map_err(|e| io_err(&path, e))
    }

    async fn read_record(&self, id: &DocumentId) -> Result<WorkflowRecord, StoreError> {
        let path = self.record_path(id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound { id: id.clone() })
            }
            Err(e) => return Err(io_err(&path, e)),
        };
        parse_record(&path, &bytes)
    }

    /// Atomic write: temp file, then rename.
    async fn write_record(&self, record: &WorkflowRecord) -> Result<(), StoreError> {
        let path = self.record_path(&record.id)?;
        let json = serde_json::to_vec_pretty(record).map_err(|e| StoreError::Corrupt {
            path: path.clone(),
            detail: e.to_string(),
        })?;

        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json)
            .await
            .map_err(|e| io_err(&tmp_path, e))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| io_err(&path, e))?;
        debug!("Wrote {} (v{})", path.display(), record.version);
        Ok(())
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        let path = self.audit_path();
        let mut line = serde_json::to_string(entry).map_err(|e| StoreError::Corrupt {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| io_err(&path, e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| io_err(&path, e))?;
        file.flush().await.map_err(|e| io_err(&path, e))
    }

    /// Append to the audit trail of a write that already committed.
    async fn record_audit(&self, entry: AuditEntry) {
        if let Err(e) = self.append_audit(&entry).await {
            warn!(
                "Audit entry '{}' for {} not recorded: {}",
                entry.action, entry.document_id, e
            );
        }
    }
}

#[async_trait]
impl RecordStore for JsonFileRecordStore {
    async fn get(&self, id: &DocumentId) -> Result<WorkflowRecord, StoreError> {
        self.read_record(id).await
    }

    async fn create(&self, source_path: &str) -> Result<WorkflowRecord, StoreError> {
        let _guard = self.write_lock.lock().await;
        let _lock = self.lock_store().await?;

        let mut record = WorkflowRecord::new(source_path);
        loop {
            let path = self.record_path(&record.id)?;
            let taken = tokio::fs::try_exists(&path)
                .await
                .map_err(|e| io_err(&path, e))?;
            if !taken {
                break;
            }
            record.id = DocumentId::generate();
        }

        self.write_record(&record).await?;
        self.record_audit(AuditEntry::system(
            &record.id,
            "insert",
            format!("Document {source_path} uploaded"),
        ))
        .await;
        info!("Registered {} as {}", source_path, record.id);
        Ok(record)
    }

    async fn update(
        &self,
        id: &DocumentId,
        transition: Transition,
    ) -> Result<WorkflowRecord, StoreError> {
        let _guard = self.write_lock.lock().await;
        let _lock = self.lock_store().await?;

        let mut record = self.read_record(id).await?;
        check_expected(&record, &transition)?;
        record.apply(&transition);

        self.write_record(&record).await?;
        self.record_audit(AuditEntry::system(id, "update", transition.describe()))
            .await;
        Ok(record)
    }

    async fn list(&self) -> Result<Vec<WorkflowRecord>, StoreError> {
        let dir = self.root.join("records");
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| io_err(&dir, e))?;

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_err(&dir, e))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| io_err(&path, e))?;
            records.push(parse_record(&path, &bytes)?);
        }
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn audit(&self, id: &DocumentId) -> Result<Vec<AuditEntry>, StoreError> {
        // Confirms the id exists.
        self.read_record(id).await?;

        let path = self.audit_path();
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&path, e)),
        };

        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| {
                serde_json::from_str::<AuditEntry>(l).map_err(|e| StoreError::Corrupt {
                    path: path.clone(),
                    detail: e.to_string(),
                })
            })
            .filter(|r| r.as_ref().map_or(true, |e| &e.document_id == id))
            .collect()
    }
}

fn parse_record(path: &Path, bytes: &[u8]) -> Result<WorkflowRecord, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Corrupt {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

fn io_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{RecordPatch, WorkflowStatus};
    use std::sync::Arc;

    fn extract_transition() -> Transition {
        Transition::new(
            WorkflowStatus::Uploaded,
            WorkflowStatus::TextExtracted,
            RecordPatch::extracted_text("Hello world"),
        )
    }

    #[tokio::test]
    async fn record_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = JsonFileRecordStore::open(dir.path()).await.unwrap();
            let rec = store.create("a.pdf").await.unwrap();
            store
                .update(
                    &rec.id,
                    Transition::new(
                        WorkflowStatus::Uploaded,
                        WorkflowStatus::TextExtracted,
                        RecordPatch::extracted_text("Hello world"),
                    ),
                )
                .await
                .unwrap();
            rec.id
        };

        let store = JsonFileRecordStore::open(dir.path()).await.unwrap();
        let rec = store.get(&id).await.unwrap();
        assert_eq!(rec.status, WorkflowStatus::TextExtracted);
        assert_eq!(rec.extracted_text.as_deref(), Some("Hello world"));
    }

    #[tokio::test]
    async fn no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileRecordStore::open(dir.path()).await.unwrap();
        let rec = store.create("a.pdf").await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path().join("records"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec![format!("{}.json", rec.id)]);
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileRecordStore::open(dir.path()).await.unwrap();
        let rec = store.create("a.pdf").await.unwrap();
        std::fs::write(
            dir.path().join("records").join(format!("{}.json", rec.id)),
            b"{not json",
        )
        .unwrap();

        let err = store.get(&rec.id).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn path_like_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileRecordStore::open(dir.path()).await.unwrap();
        let err = store.get(&"../etc/passwd".into()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn audit_is_filtered_per_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileRecordStore::open(dir.path()).await.unwrap();
        let a = store.create("a.pdf").await.unwrap();
        let b = store.create("b.pdf").await.unwrap();

        let trail = store.audit(&a.id).await.unwrap();
        assert_eq!(trail.len(), 1);
        assert!(trail[0].note.contains("a.pdf"));
        assert_eq!(store.audit(&b.id).await.unwrap().len(), 1);
        assert_eq!(store.list().await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn two_stores_on_one_root_commit_once() {
        let dir = tempfile::tempdir().unwrap();
        let a = Arc::new(JsonFileRecordStore::open(dir.path()).await.unwrap());
        let b = Arc::new(JsonFileRecordStore::open(dir.path()).await.unwrap());

        for _ in 0..50 {
            let rec = a.create("a.pdf").await.unwrap();
            let (id_a, id_b) = (rec.id.clone(), rec.id.clone());
            let (sa, sb) = (Arc::clone(&a), Arc::clone(&b));
            let first = tokio::spawn(async move { sa.update(&id_a, extract_transition()).await });
            let second = tokio::spawn(async move { sb.update(&id_b, extract_transition()).await });
            let results = [first.await.unwrap(), second.await.unwrap()];

            let committed = results.iter().filter(|r| r.is_ok()).count();
            assert_eq!(committed, 1, "{results:?}");
            assert!(results
                .iter()
                .any(|r| matches!(r, Err(StoreError::Conflict { .. }))));

            let stored = b.get(&rec.id).await.unwrap();
            assert_eq!(stored.status, WorkflowStatus::TextExtracted);
            assert_eq!(stored.version, rec.version + 1);
        }
    }

    #[tokio::test]
    async fn lock_file_stays_outside_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileRecordStore::open(dir.path()).await.unwrap();
        let rec = store.create("a.pdf").await.unwrap();
        store.update(&rec.id, extract_transition()).await.unwrap();

        assert!(dir.path().join("store.lock").is_file());
        let names: Vec<String> = std::fs::read_dir(dir.path().join("records"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec![format!("{}.json", rec.id)]);
    }

    #[tokio::test]
    async fn audit_failure_does_not_undo_a_commit() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileRecordStore::open(dir.path()).await.unwrap();
        // A directory where the audit file should be makes every append fail.
        std::fs::create_dir(dir.path().join("audit.jsonl")).unwrap();

        let rec = store.create("a.pdf").await.unwrap();
        let updated = store.update(&rec.id, extract_transition()).await.unwrap();
        assert_eq!(updated.status, WorkflowStatus::TextExtracted);

        let reopened = JsonFileRecordStore::open(dir.path()).await.unwrap();
        let stored = reopened.get(&rec.id).await.unwrap();
        assert_eq!(stored.status, WorkflowStatus::TextExtracted);
        assert_eq!(stored.version, updated.version);
    }

    #[tokio::test]
    async fn create_reports_unreadable_records_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileRecordStore::open(dir.path()).await.unwrap();
        // Replacing records/ with a plain file makes the id lookup fail.
        std::fs::remove_dir(dir.path().join("records")).unwrap();
        std::fs::write(dir.path().join("records"), b"").unwrap();

        let err = store.create("a.pdf").await.unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }), "{err:?}");
    }
}
