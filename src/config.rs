//! Configuration types for the document workflow.
//!
//! Every knob of the built-in providers and the orchestrator lives in
//! [`WorkflowConfig`], built via [`WorkflowConfigBuilder`]. Callers that
//! inject their own adapters only need the orchestrator fields; the provider
//! fields are read by [`crate::providers`] when the driver assembles the
//! default adapters.

use crate::error::WorkflowError;
use crate::progress::WorkflowObserver;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default OpenAI-compatible endpoint for speech and image generation.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Configuration for running document workflows.
///
/// # Example
/// ```rust
/// use edgequake_docflow::WorkflowConfig;
///
/// let config = WorkflowConfig::builder()
///     .data_dir("data")
///     .output_dir("output")
///     .model("gpt-4o-mini")
///     .max_retries(2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct WorkflowConfig {
    /// Directory of the JSON record store. Default: `data`.
    pub data_dir: PathBuf,

    /// Root under which generated audio and images are written. Default: `output`.
    pub output_dir: PathBuf,

    /// Summarization model identifier. If None, `gpt-4o-mini`.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, auto-detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for summarization. Default: 0.3.
    pub temperature: f32,

    /// Maximum tokens the summary may use. Default: 1024.
    pub max_tokens: usize,

    /// Provider-call retries inside one stage attempt. Default: 2.
    ///
    /// These are transparent retries of a single HTTP/LLM call. A stage that
    /// still fails after them is persisted as `failed` and needs an explicit
    /// workflow retry.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per provider-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Timeout for downloading URL sources in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Text-to-speech model. Default: `gpt-4o-mini-tts`.
    pub tts_model: String,

    /// Text-to-speech voice. Default: `alloy`.
    pub tts_voice: String,

    /// Image-generation model. Default: `dall-e-3`.
    pub image_model: String,

    /// Image size requested from the provider. Default: `1024x1024`.
    pub image_size: String,

    /// Base URL of the OpenAI-compatible speech/image API.
    pub openai_base_url: String,

    /// API key for speech/image calls. Default: `OPENAI_API_KEY` if set.
    pub openai_api_key: Option<String>,

    /// Custom summarization system prompt. If None, uses built-in default.
    pub summary_prompt: Option<String>,

    /// Upper bound on stage executions per run. Default: 10.
    pub max_steps: usize,

    /// Optional observer receiving per-stage events.
    pub observer: Option<Arc<dyn WorkflowObserver>>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("output"),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.3,
            max_tokens: 1024,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            download_timeout_secs: 120,
            tts_model: "gpt-4o-mini-tts".to_string(),
            tts_voice: "alloy".to_string(),
            image_model: "dall-e-3".to_string(),
            image_size: "1024x1024".to_string(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            openai_api_key: std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            summary_prompt: None,
            max_steps: 10,
            observer: None,
        }
    }
}

impl fmt::Debug for WorkflowConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowConfig")
            .field("data_dir", &self.data_dir)
            .field("output_dir", &self.output_dir)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("tts_model", &self.tts_model)
            .field("tts_voice", &self.tts_voice)
            .field("image_model", &self.image_model)
            .field("image_size", &self.image_size)
            .field("openai_base_url", &self.openai_base_url)
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<redacted>"))
            .field("max_steps", &self.max_steps)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn WorkflowObserver>"))
            .finish()
    }
}

impl WorkflowConfig {
    pub fn builder() -> WorkflowConfigBuilder {
        WorkflowConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`WorkflowConfig`].
#[derive(Debug)]
pub struct WorkflowConfigBuilder {
    config: WorkflowConfig,
}

impl WorkflowConfigBuilder {
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn tts_model(mut self, model: impl Into<String>) -> Self {
        self.config.tts_model = model.into();
        self
    }

    pub fn tts_voice(mut self, voice: impl Into<String>) -> Self {
        self.config.tts_voice = voice.into();
        self
    }

    pub fn image_model(mut self, model: impl Into<String>) -> Self {
        self.config.image_model = model.into();
        self
    }

    pub fn image_size(mut self, size: impl Into<String>) -> Self {
        self.config.image_size = size.into();
        self
    }

    pub fn openai_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.openai_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn openai_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.openai_api_key = Some(key.into());
        self
    }

    pub fn summary_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.summary_prompt = Some(prompt.into());
        self
    }

    pub fn max_steps(mut self, n: usize) -> Self {
        self.config.max_steps = n;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn WorkflowObserver>) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<WorkflowConfig, WorkflowError> {
        let c = &self.config;
        if c.api_timeout_secs == 0 {
            return Err(WorkflowError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_steps < crate::pipeline::stage::Stage::ALL.len() {
            return Err(WorkflowError::InvalidConfig(format!(
                "max_steps must be at least {}, got {}",
                crate::pipeline::stage::Stage::ALL.len(),
                c.max_steps
            )));
        }
        if c.max_tokens == 0 {
            return Err(WorkflowError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if !(c.openai_base_url.starts_with("http://") || c.openai_base_url.starts_with("https://"))
        {
            return Err(WorkflowError::InvalidConfig(format!(
                "openai_base_url must be an http(s) URL, got '{}'",
                c.openai_base_url
            )));
        }
        Ok(self.config)
    }
}
