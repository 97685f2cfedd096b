//! Stage executors: one per transition in [`Stage`].
//!
//! An executor validates the record fields its stage consumes, calls its
//! capability adapter, and returns the field patch plus the next status. It
//! never writes to the store; the orchestrator commits the result so the
//! store write stays the single commit point of a stage.
//!
//! Failures come back as [`StageError`] and are always recoverable.

use crate::capability::{ImageGenerator, SpeechSynthesizer, TextExtractor, TextSummarizer};
use crate::error::StageError;
use crate::pipeline::stage::Stage;
use crate::record::{RecordPatch, WorkflowRecord, WorkflowStatus};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Successful result of one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput {
    pub patch: RecordPatch,
    pub next: WorkflowStatus,
}

impl StageOutput {
    fn new(stage: Stage, patch: RecordPatch) -> Self {
        Self {
            patch,
            next: stage.output_status(),
        }
    }
}

#[async_trait]
pub trait StageExecutor: Send + Sync {
    fn stage(&self) -> Stage;

    async fn run(&self, record: &WorkflowRecord) -> Result<StageOutput, StageError>;
}

/// `uploaded → text_extracted`
pub struct ExtractExecutor {
    extractor: Arc<dyn TextExtractor>,
}

/// `text_extracted → summarized`
pub struct SummarizeExecutor {
    summarizer: Arc<dyn TextSummarizer>,
}

/// `summarized → audio_generated`
pub struct SynthesizeExecutor {
    synthesizer: Arc<dyn SpeechSynthesizer>,
}

/// `audio_generated → image_generated`
pub struct IllustrateExecutor {
    generator: Arc<dyn ImageGenerator>,
}

/// `image_generated → completed`. Checks every output is present; calls no
/// provider.
pub struct FinalizeExecutor;

#[async_trait]
impl StageExecutor for ExtractExecutor {
    fn stage(&self) -> Stage {
        Stage::Extract
    }

    async fn run(&self, record: &WorkflowRecord) -> Result<StageOutput, StageError> {
        if record.source_path.trim().is_empty() {
            return Err(StageError::input(self.stage(), "source path is empty"));
        }
        let text = self
            .extractor
            .extract(&record.source_path)
            .await
            .map_err(|e| StageError::from_capability(self.stage(), e))?;

        let text = text.trim();
        if text.is_empty() {
            return Err(StageError::input(
                self.stage(),
                format!("no text could be extracted from '{}'", record.source_path),
            ));
        }
        debug!("{}: extracted {} chars", record.id, text.len());
        Ok(StageOutput::new(
            self.stage(),
            RecordPatch::extracted_text(text),
        ))
    }
}

#[async_trait]
impl StageExecutor for SummarizeExecutor {
    fn stage(&self) -> Stage {
        Stage::Summarize
    }

    async fn run(&self, record: &WorkflowRecord) -> Result<StageOutput, StageError> {
        let text = required(self.stage(), record.extracted_text.as_deref(), "extracted text")?;
        let summary = self
            .summarizer
            .summarize(text)
            .await
            .map_err(|e| StageError::from_capability(self.stage(), e))?;

        if summary.trim().is_empty() {
            return Err(StageError::provider(
                self.stage(),
                "summarizer returned an empty summary",
            ));
        }
        debug!("{}: summary {} chars", record.id, summary.len());
        Ok(StageOutput::new(self.stage(), RecordPatch::summary(summary)))
    }
}

#[async_trait]
impl StageExecutor for SynthesizeExecutor {
    fn stage(&self) -> Stage {
        Stage::Synthesize
    }

    async fn run(&self, record: &WorkflowRecord) -> Result<StageOutput, StageError> {
        let summary = required(self.stage(), record.summary.as_deref(), "summary")?;
        let audio = self
            .synthesizer
            .synthesize(&record.id, summary)
            .await
            .map_err(|e| StageError::from_capability(self.stage(), e))?;
        debug!("{}: audio at {}", record.id, audio);
        Ok(StageOutput::new(self.stage(), RecordPatch::audio_path(audio)))
    }
}

#[async_trait]
impl StageExecutor for IllustrateExecutor {
    fn stage(&self) -> Stage {
        Stage::Illustrate
    }

    async fn run(&self, record: &WorkflowRecord) -> Result<StageOutput, StageError> {
        // The prompt is the summary verbatim.
        let prompt = required(self.stage(), record.summary.as_deref(), "summary")?;
        let image = self
            .generator
            .generate_image(&record.id, prompt)
            .await
            .map_err(|e| StageError::from_capability(self.stage(), e))?;
        debug!("{}: image at {}", record.id, image);
        Ok(StageOutput::new(self.stage(), RecordPatch::image_path(image)))
    }
}

#[async_trait]
impl StageExecutor for FinalizeExecutor {
    fn stage(&self) -> Stage {
        Stage::Finalize
    }

    async fn run(&self, record: &WorkflowRecord) -> Result<StageOutput, StageError> {
        let missing: Vec<&str> = [
            ("extracted_text", record.extracted_text.is_none()),
            ("summary", record.summary.is_none()),
            ("audio_path", record.audio_path.is_none()),
            ("image_path", record.image_path.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();

        if !missing.is_empty() {
            return Err(StageError::input(
                self.stage(),
                format!("cannot complete, missing: {}", missing.join(", ")),
            ));
        }
        Ok(StageOutput::new(self.stage(), RecordPatch::default()))
    }
}

fn required<'a>(stage: Stage, value: Option<&'a str>, what: &str) -> Result<&'a str, StageError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(StageError::input(stage, format!("{what} is missing or empty"))),
    }
}

/// One executor per stage, looked up through the transition table.
pub struct StageExecutors {
    extract: ExtractExecutor,
    summarize: SummarizeExecutor,
    synthesize: SynthesizeExecutor,
    illustrate: IllustrateExecutor,
    finalize: FinalizeExecutor,
}

impl StageExecutors {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        summarizer: Arc<dyn TextSummarizer>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        generator: Arc<dyn ImageGenerator>,
    ) -> Self {
        Self {
            extract: ExtractExecutor { extractor },
            summarize: SummarizeExecutor { summarizer },
            synthesize: SynthesizeExecutor { synthesizer },
            illustrate: IllustrateExecutor { generator },
            finalize: FinalizeExecutor,
        }
    }

    pub fn for_stage(&self, stage: Stage) -> &dyn StageExecutor {
        match stage {
            Stage::Extract => &self.extract,
            Stage::Summarize => &self.summarize,
            Stage::Synthesize => &self.synthesize,
            Stage::Illustrate => &self.illustrate,
            Stage::Finalize => &self.finalize,
        }
    }
}
