//! # edgequake-docflow
//!
//! Durable, resumable document workflows: text extraction, summarization,
//! narration and illustration of uploaded documents, each committed to a
//! record store as its own guarded step.
//!
//! ## Workflow Overview
//!
//! ```text
//! document
//!  │
//!  ├─ 1. Extract     pdfium text layer | UTF-8 | vision OCR   → extracted_text
//!  ├─ 2. Summarize   chat completion via edgequake-llm        → summary
//!  ├─ 3. Synthesize  text-to-speech of the summary            → audio_path
//!  ├─ 4. Illustrate  image generation from the summary        → image_path
//!  └─ 5. Finalize    all outputs present                      → completed
//! ```
//!
//! A run picks up at whatever status the record is in, so an interrupted or
//! retried document never repeats work that was already committed. Any stage
//! failure moves the record to `failed` with the stage and reason recorded;
//! [`WorkflowDriver::retry`] resumes it at that stage.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_docflow::{WorkflowConfig, WorkflowDriver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY
//!     let config = WorkflowConfig::builder().output_dir("out").build()?;
//!     let driver = WorkflowDriver::from_config(&config).await?;
//!     let record = driver.process("report.pdf").await?;
//!     println!("{} → {}", record.id, record.status);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docflow` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-docflow = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod capability;
pub mod config;
pub mod driver;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod providers;
pub mod record;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use capability::{BlobStore, ImageGenerator, SpeechSynthesizer, TextExtractor, TextSummarizer};
pub use config::{WorkflowConfig, WorkflowConfigBuilder};
pub use driver::WorkflowDriver;
pub use error::{CapabilityError, StageError, StoreError, WorkflowError};
pub use orchestrator::Orchestrator;
pub use pipeline::executors::{StageExecutor, StageExecutors, StageOutput};
pub use pipeline::stage::Stage;
pub use progress::{NoopObserver, WorkflowObserver};
pub use record::{
    AuditEntry, BlobRef, DocumentId, FailureInfo, FailureKind, RecordPatch, Transition,
    WorkflowRecord, WorkflowStatus,
};
pub use store::{JsonFileRecordStore, MemoryRecordStore, RecordStore};
pub use tokio_util::sync::CancellationToken;
