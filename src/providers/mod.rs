//! Built-in capability adapters.
//!
//! ```text
//! extract    FileTextExtractor       local/URL source → pdfium text | UTF-8 | vision OCR
//! summarize  LlmSummarizer           edgequake-llm chat completion
//! synthesize OpenAiSpeechSynthesizer POST /audio/speech       → BlobStore
//! illustrate OpenAiImageGenerator    POST /images/generations → BlobStore
//! ```
//!
//! Every provider call runs under [`RetryPolicy`]: a per-call timeout and a
//! bounded number of transparent retries with exponential backoff. Input
//! errors are never retried.

pub mod blob;
pub mod extract;
pub mod image;
pub mod input;
pub mod postprocess;
pub mod speech;
pub mod summarize;

pub use blob::FsBlobStore;
pub use extract::FileTextExtractor;
pub use image::OpenAiImageGenerator;
pub use speech::OpenAiSpeechSynthesizer;
pub use summarize::LlmSummarizer;

use crate::capability::BlobStore;
use crate::config::WorkflowConfig;
use crate::error::{CapabilityError, WorkflowError};
use crate::pipeline::executors::StageExecutors;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::future::Future;
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};
use tracing::warn;

/// Default summarization model when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Timeout and retry behaviour of a single provider call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_ms: config.retry_backoff_ms,
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    /// Run `op` until it succeeds, fails with an input error, or the retries
    /// are used up. Backoff doubles per attempt: 500 ms → 1 s → 2 s.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, CapabilityError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CapabilityError>>,
    {
        let mut last_err: Option<CapabilityError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "{}: retry {}/{} after {}ms",
                    what, attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match timeout(self.timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(CapabilityError::Input(msg))) => return Err(CapabilityError::Input(msg)),
                Ok(Err(e)) => {
                    warn!("{}: attempt {} failed — {}", what, attempt + 1, e);
                    last_err = Some(e);
                }
                Err(_) => {
                    let e = CapabilityError::Provider(format!(
                        "{what} timed out after {}s",
                        self.timeout.as_secs()
                    ));
                    warn!("{}: attempt {} timed out", what, attempt + 1);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| CapabilityError::Provider(format!("{what} failed"))))
    }
}

/// Map a non-success HTTP response to a capability error.
///
/// Request-shape rejections (400, 413, 422) are the caller's input; anything
/// else, 401/429/5xx included, is the provider's problem.
pub(crate) async fn check_response(
    what: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, CapabilityError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = provider_message(&body).unwrap_or(body);
    let msg = format!("{what} returned HTTP {}: {}", status.as_u16(), detail.trim());
    match status.as_u16() {
        400 | 413 | 422 => Err(CapabilityError::Input(msg)),
        _ => Err(CapabilityError::Provider(msg)),
    }
}

/// Pull `error.message` out of an OpenAI-style error body.
fn provider_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")?
        .get("message")?
        .as_str()
        .map(str::to_string)
}

pub(crate) fn http_error(what: &str, e: reqwest::Error) -> CapabilityError {
    CapabilityError::Provider(format!("{what} request failed: {e}"))
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. pre-built `config.provider`
/// 2. `config.provider_name` + model
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`
/// 4. OpenAI when `OPENAI_API_KEY` is set
/// 5. [`ProviderFactory::from_env`] auto-detection
pub fn resolve_llm_provider(config: &WorkflowConfig) -> Result<Arc<dyn LLMProvider>, WorkflowError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(ref name) = config.provider_name {
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_provider(&prov, &env_model);
        }
    }

    if config.openai_api_key.is_some() {
        return create_provider("openai", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| WorkflowError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass --provider.\n\
                Error: {e}"
            ),
        })?;
    Ok(llm_provider)
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, WorkflowError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        WorkflowError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Executors wired to the built-in providers.
///
/// Speech and image generation need an OpenAI-compatible API key.
pub fn default_executors(config: &WorkflowConfig) -> Result<StageExecutors, WorkflowError> {
    let llm = resolve_llm_provider(config)?;
    let api_key =
        config
            .openai_api_key
            .clone()
            .ok_or_else(|| WorkflowError::ProviderNotConfigured {
                provider: "openai".to_string(),
                hint: "Speech and image generation need an API key.\n\
                       Set OPENAI_API_KEY or pass --openai-api-key."
                    .to_string(),
            })?;

    let client = reqwest::Client::builder()
        .build()
        .map_err(|e| WorkflowError::Internal(format!("HTTP client: {e}")))?;
    let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(&config.output_dir));
    let policy = RetryPolicy::from_config(config);

    Ok(StageExecutors::new(
        Arc::new(FileTextExtractor::new(
            config.download_timeout_secs,
            Some(Arc::clone(&llm)),
            policy.clone(),
        )),
        Arc::new(LlmSummarizer::from_config(llm, config)),
        Arc::new(OpenAiSpeechSynthesizer::new(
            client.clone(),
            api_key.clone(),
            config,
            Arc::clone(&blobs),
        )),
        Arc::new(OpenAiImageGenerator::new(client, api_key, config, blobs)),
    ))
}

/// One-route HTTP server for adapter tests: every request gets `status`
/// with `body`. Returns the base URL.
#[cfg(test)]
pub(crate) async fn canned_server(status: u16, body: &'static str) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            // Drain headers and body so the client sees a clean close.
            loop {
                let n = socket.read(&mut buf).await.unwrap_or(0);
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|l| {
                            let (k, v) = l.split_once(':')?;
                            k.eq_ignore_ascii_case("content-length")
                                .then(|| v.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {status} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });
    format!("http://{addr}")
}
