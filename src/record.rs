//! Persisted per-document state.
//!
//! A [`WorkflowRecord`] is the only source of truth for where a document is in
//! the pipeline. Every field except `id`, `source_path` and `created_at` is
//! written exclusively through a guarded [`Transition`] so the record on disk
//! always reflects a whole number of completed stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::pipeline::stage::Stage;

/// Opaque, never-reused identifier of a document's workflow record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Allocate a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Reference to a generated media blob (audio or image).
///
/// The core never interprets the contents; it is whatever the
/// [`crate::capability::BlobStore`] handed back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobRef(String);

impl BlobRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pipeline position of a record.
///
/// Serialised as the snake_case strings callers poll for
/// (`"uploaded"`, `"text_extracted"`, …).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Uploaded,
    TextExtracted,
    Summarized,
    AudioGenerated,
    ImageGenerated,
    Completed,
    Failed,
}

impl WorkflowStatus {
    /// The forward order of every non-failed status.
    pub const ORDER: [WorkflowStatus; 6] = [
        WorkflowStatus::Uploaded,
        WorkflowStatus::TextExtracted,
        WorkflowStatus::Summarized,
        WorkflowStatus::AudioGenerated,
        WorkflowStatus::ImageGenerated,
        WorkflowStatus::Completed,
    ];

    /// `completed` and `failed` stop the orchestrator loop.
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Failed)
    }

    /// Position along [`Self::ORDER`]; `None` for `failed`.
    pub fn rank(self) -> Option<usize> {
        Self::ORDER.iter().position(|s| *s == self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStatus::Uploaded => "uploaded",
            WorkflowStatus::TextExtracted => "text_extracted",
            WorkflowStatus::Summarized => "summarized",
            WorkflowStatus::AudioGenerated => "audio_generated",
            WorkflowStatus::ImageGenerated => "image_generated",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a stage failed: bad input (needs outside correction) or a provider
/// problem (retry as-is).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Input,
    Provider,
}

/// One document's workflow state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: DocumentId,
    pub source_path: String,
    pub extracted_text: Option<String>,
    pub summary: Option<String>,
    pub audio_path: Option<BlobRef>,
    pub image_path: Option<BlobRef>,
    pub status: WorkflowStatus,
    pub failure_reason: Option<String>,
    /// Stage whose failure moved the record to `failed`.
    pub failed_stage: Option<Stage>,
    pub failure_kind: Option<FailureKind>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every committed write.
    pub version: u64,
}

impl WorkflowRecord {
    /// A freshly registered document in `uploaded` status.
    pub fn new(source_path: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: DocumentId::generate(),
            source_path: source_path.into(),
            extracted_text: None,
            summary: None,
            audio_path: None,
            image_path: None,
            status: WorkflowStatus::Uploaded,
            failure_reason: None,
            failed_stage: None,
            failure_kind: None,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Apply a transition in memory. Stores call this after checking the
    /// expected-status guard, then persist the result as one write.
    pub fn apply(&mut self, transition: &Transition) {
        let patch = &transition.patch;
        if let Some(ref text) = patch.extracted_text {
            self.extracted_text = Some(text.clone());
        }
        if let Some(ref summary) = patch.summary {
            self.summary = Some(summary.clone());
        }
        if let Some(ref audio) = patch.audio_path {
            self.audio_path = Some(audio.clone());
        }
        if let Some(ref image) = patch.image_path {
            self.image_path = Some(image.clone());
        }

        match patch.failure {
            Some(ref failure) => {
                self.failure_reason = Some(failure.reason.clone());
                self.failed_stage = Some(failure.stage);
                self.failure_kind = Some(failure.kind);
            }
            None => {
                self.failure_reason = None;
                self.failed_stage = None;
                self.failure_kind = None;
            }
        }

        self.status = transition.next;
        self.updated_at = Utc::now();
        self.version += 1;
    }
}

/// Failure details written alongside a move to `failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub stage: Stage,
    pub kind: FailureKind,
    pub reason: String,
}

/// Field updates produced by a single stage.
///
/// `None` means "leave unchanged". Failure info is the exception: it is
/// replaced wholesale, so any transition without `failure` clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPatch {
    pub extracted_text: Option<String>,
    pub summary: Option<String>,
    pub audio_path: Option<BlobRef>,
    pub image_path: Option<BlobRef>,
    pub failure: Option<FailureInfo>,
}

impl RecordPatch {
    pub fn extracted_text(text: impl Into<String>) -> Self {
        Self {
            extracted_text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn summary(summary: impl Into<String>) -> Self {
        Self {
            summary: Some(summary.into()),
            ..Default::default()
        }
    }

    pub fn audio_path(audio: BlobRef) -> Self {
        Self {
            audio_path: Some(audio),
            ..Default::default()
        }
    }

    pub fn image_path(image: BlobRef) -> Self {
        Self {
            image_path: Some(image),
            ..Default::default()
        }
    }

    pub fn failure(failure: FailureInfo) -> Self {
        Self {
            failure: Some(failure),
            ..Default::default()
        }
    }
}

/// A guarded status change: applied only if the stored status equals
/// `expected`.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub expected: WorkflowStatus,
    pub next: WorkflowStatus,
    pub patch: RecordPatch,
}

impl Transition {
    pub fn new(expected: WorkflowStatus, next: WorkflowStatus, patch: RecordPatch) -> Self {
        Self {
            expected,
            next,
            patch,
        }
    }

    /// Short human-readable note for the audit trail.
    pub fn describe(&self) -> String {
        match self.patch.failure {
            Some(ref f) => format!("{} failed ({:?}): {}", f.stage, f.kind, f.reason),
            None => format!("status {} -> {}", self.expected, self.next),
        }
    }
}

/// One line of the per-document audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub document_id: DocumentId,
    pub action: String,
    pub actor: String,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// An entry attributed to the workflow engine itself.
    pub fn system(document_id: &DocumentId, action: &str, note: impl Into<String>) -> Self {
        Self {
            document_id: document_id.clone(),
            action: action.to_string(),
            actor: "system".to_string(),
            note: note.into(),
            created_at: Utc::now(),
        }
    }
}
