//! Summarization through an edgequake-llm chat provider.
//!
//! The request is two messages: the system prompt (built-in or configured
//! override) and the document text as the user turn. The answer goes through
//! [`clean_llm_text`] before it becomes the record's summary.

use super::postprocess::clean_llm_text;
use super::RetryPolicy;
use crate::capability::{require_text, TextSummarizer};
use crate::config::WorkflowConfig;
use crate::error::CapabilityError;
use crate::prompts::SUMMARY_SYSTEM_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

pub struct LlmSummarizer {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    temperature: f32,
    max_tokens: usize,
    policy: RetryPolicy,
}

impl LlmSummarizer {
    pub fn from_config(provider: Arc<dyn LLMProvider>, config: &WorkflowConfig) -> Self {
        Self {
            provider,
            system_prompt: config
                .summary_prompt
                .clone()
                .unwrap_or_else(|| SUMMARY_SYSTEM_PROMPT.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            policy: RetryPolicy::from_config(config),
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }

    async fn request_summary(&self, text: &str) -> Result<String, CapabilityError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(text),
        ];
        let options = self.options();

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| CapabilityError::Provider(format!("summarizer: {e}")))?;

        debug!(
            "Summary: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(clean_llm_text(&response.content))
    }
}

#[async_trait]
impl TextSummarizer for LlmSummarizer {
    async fn summarize(&self, text: &str) -> Result<String, CapabilityError> {
        let text = require_text(text, "text to summarize")?;
        self.policy
            .run("summarize", || self.request_summary(text))
            .await
    }
}
