//! Text-to-speech via an OpenAI-compatible `/audio/speech` endpoint.

use super::{check_response, http_error, RetryPolicy};
use crate::capability::{require_text, BlobStore, SpeechSynthesizer};
use crate::config::WorkflowConfig;
use crate::error::CapabilityError;
use crate::record::{BlobRef, DocumentId};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

pub struct OpenAiSpeechSynthesizer {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    voice: String,
    blobs: Arc<dyn BlobStore>,
    policy: RetryPolicy,
}

impl OpenAiSpeechSynthesizer {
    pub fn new(
        client: reqwest::Client,
        api_key: String,
        config: &WorkflowConfig,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            client,
            api_key,
            base_url: config.openai_base_url.clone(),
            model: config.tts_model.clone(),
            voice: config.tts_voice.clone(),
            blobs,
            policy: RetryPolicy::from_config(config),
        }
    }

    async fn request_audio(&self, text: &str) -> Result<Vec<u8>, CapabilityError> {
        let body = SpeechRequest {
            model: &self.model,
            voice: &self.voice,
            input: text,
            response_format: "mp3",
        };
        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| http_error("speech", e))?;
        let response = check_response("speech", response).await?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| http_error("speech", e))?;
        if bytes.is_empty() {
            return Err(CapabilityError::Provider(
                "speech provider returned no audio".into(),
            ));
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeechSynthesizer {
    async fn synthesize(&self, id: &DocumentId, text: &str) -> Result<BlobRef, CapabilityError> {
        let text = require_text(text, "text to synthesize")?;
        let audio = self
            .policy
            .run("speech", || self.request_audio(text))
            .await?;
        let blob = self.blobs.put(&format!("audio/{id}.mp3"), &audio).await?;
        info!("TTS saved: {}", blob);
        Ok(blob)
    }
}
