//! The single authoritative transition table.
//!
//! Every pipeline stage maps exactly one input status to exactly one output
//! status. The orchestrator never hard-codes a status pair anywhere else; it
//! asks [`Stage::for_status`] which stage to run next and
//! [`Stage::input_status`] where a retry should resume.

use crate::record::WorkflowStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// `uploaded → text_extracted`
    Extract,
    /// `text_extracted → summarized`
    Summarize,
    /// `summarized → audio_generated`
    Synthesize,
    /// `audio_generated → image_generated`
    Illustrate,
    /// `image_generated → completed`
    Finalize,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Extract,
        Stage::Summarize,
        Stage::Synthesize,
        Stage::Illustrate,
        Stage::Finalize,
    ];

    /// Status a record must be in for this stage to run.
    pub fn input_status(self) -> WorkflowStatus {
        match self {
            Stage::Extract => WorkflowStatus::Uploaded,
            Stage::Summarize => WorkflowStatus::TextExtracted,
            Stage::Synthesize => WorkflowStatus::Summarized,
            Stage::Illustrate => WorkflowStatus::AudioGenerated,
            Stage::Finalize => WorkflowStatus::ImageGenerated,
        }
    }

    /// Status committed when this stage succeeds.
    pub fn output_status(self) -> WorkflowStatus {
        match self {
            Stage::Extract => WorkflowStatus::TextExtracted,
            Stage::Summarize => WorkflowStatus::Summarized,
            Stage::Synthesize => WorkflowStatus::AudioGenerated,
            Stage::Illustrate => WorkflowStatus::ImageGenerated,
            Stage::Finalize => WorkflowStatus::Completed,
        }
    }

    /// The stage whose input status is `status`, if any.
    ///
    /// `None` for the terminal statuses.
    pub fn for_status(status: WorkflowStatus) -> Option<Stage> {
        Self::ALL.into_iter().find(|s| s.input_status() == status)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Summarize => "summarize",
            Stage::Synthesize => "synthesize",
            Stage::Illustrate => "illustrate",
            Stage::Finalize => "finalize",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
