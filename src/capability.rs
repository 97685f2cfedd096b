//! Capability interfaces: the boundary to external providers.
//!
//! The orchestrator depends only on these traits, never on a concrete
//! provider, so tests inject mocks and deployments swap vendors without
//! touching orchestration. Each trait is a single async request/response
//! method with no shared state. Concrete implementations live in
//! [`crate::providers`].
//!
//! Timeouts belong to the adapter: an implementation that gives up on a slow
//! provider reports it as [`CapabilityError::Provider`].

use crate::error::CapabilityError;
use crate::record::{BlobRef, DocumentId};
use async_trait::async_trait;

/// Pulls plain text out of an uploaded document.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, source_path: &str) -> Result<String, CapabilityError>;
}

/// Condenses document text into a short summary.
#[async_trait]
pub trait TextSummarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String, CapabilityError>;
}

/// Turns summary text into narrated audio.
///
/// `id` is a naming hint only: re-invoking for the same document must
/// overwrite the same blob rather than create a new one.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, id: &DocumentId, text: &str) -> Result<BlobRef, CapabilityError>;
}

/// Renders an illustration from a text prompt. Same naming rule as
/// [`SpeechSynthesizer`].
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate_image(
        &self,
        id: &DocumentId,
        prompt: &str,
    ) -> Result<BlobRef, CapabilityError>;
}

/// Storage for generated media.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `bytes` under `key` (e.g. `audio/<id>.mp3`), replacing any
    /// previous blob, and return its reference.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<BlobRef, CapabilityError>;
}

/// Reject empty or whitespace-only input before calling a provider.
pub fn require_text<'a>(text: &'a str, what: &str) -> Result<&'a str, CapabilityError> {
    if text.trim().is_empty() {
        Err(CapabilityError::Input(format!("{what} is empty")))
    } else {
        Ok(text)
    }
}
