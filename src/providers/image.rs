//! Image generation via an OpenAI-compatible `/images/generations` endpoint.
//!
//! The image is requested as `b64_json` so no second download is needed; the
//! decoded PNG is handed to the blob store.

use super::{check_response, http_error, RetryPolicy};
use crate::capability::{require_text, BlobStore, ImageGenerator};
use crate::config::WorkflowConfig;
use crate::error::CapabilityError;
use crate::record::{BlobRef, DocumentId};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    size: &'a str,
    n: u8,
    response_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    b64_json: Option<String>,
}

pub struct OpenAiImageGenerator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    size: String,
    blobs: Arc<dyn BlobStore>,
    policy: RetryPolicy,
}

impl OpenAiImageGenerator {
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
            model: config.image_model.clone(),
            size: config.image_size.clone(),
            blobs,
            policy: RetryPolicy::from_config(config),
        }
    }

    async fn request_image(&self, prompt: &str) -> Result<Vec<u8>, CapabilityError> {
        let body = ImageRequest {
            model: &self.model,
            prompt,
            size: &self.size,
            n: 1,
            response_format: "b64_json",
        };
        let response = self
            .client
            .post(format!("{}/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| http_error("image generation", e))?;
        let response = check_response("image generation", response).await?;

        let parsed: ImageResponse = response
            .json()
            .await
            .map_err(|e| http_error("image generation", e))?;
        decode_first_image(parsed)
    }
}

fn decode_first_image(response: ImageResponse) -> Result<Vec<u8>, CapabilityError> {
    let b64 = response
        .data
        .into_iter()
        .find_map(|d| d.b64_json)
        .ok_or_else(|| CapabilityError::Provider("image provider returned no image data".into()))?;
    STANDARD
        .decode(b64.trim())
        .map_err(|e| CapabilityError::Provider(format!("image payload is not valid base64: {e}")))
}

#[async_trait]
impl ImageGenerator for OpenAiImageGenerator {
    async fn generate_image(
        &self,
        id: &DocumentId,
        prompt: &str,
    ) -> Result<BlobRef, CapabilityError> {
        // Passed through verbatim; only emptiness is checked.
        let prompt = require_text(prompt, "image prompt")?;
        let png = self
            .policy
            .run("image generation", || self.request_image(prompt))
            .await?;
        let blob = self.blobs.put(&format!("images/{id}.png"), &png).await?;
        info!("Image generated and saved: {}", blob);
        Ok(blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_b64_payload() {
        let json = format!(r#"{{"data":[{{"b64_json":"{}"}}]}}"#, STANDARD.encode(b"\x89PNG"));
        let parsed: ImageResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(decode_first_image(parsed).unwrap(), b"\x89PNG");
    }

    #[test]
    fn missing_payload_is_provider_error() {
        let parsed: ImageResponse = serde_json::from_str(r#"{"data":[{"url":"https://x"}]}"#).unwrap();
        assert!(matches!(
            decode_first_image(parsed),
            Err(CapabilityError::Provider(_))
        ));
    }

    #[test]
    fn request_serialises_prompt_unchanged() {
        let body = ImageRequest {
            model: "dall-e-3",
            prompt: "Hello world.",
            size: "1024x1024",
            n: 1,
            response_format: "b64_json",
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["prompt"], "Hello world.");
        assert_eq!(v["response_format"], "b64_json");
    }
}
