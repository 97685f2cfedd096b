//! System prompts for the LLM-backed stages.
//!
//! Callers can override the summary prompt via
//! [`crate::config::WorkflowConfig::summary_prompt`]; the constants here are
//! used only when no override is provided.

/// Default system prompt for the summarization stage.
pub const SUMMARY_SYSTEM_PROMPT: &str = "Summarize the document in 3-4 bullet points.";

/// System prompt for transcribing an uploaded image (scan, photo, screenshot).
pub const OCR_SYSTEM_PROMPT: &str = r#"You are an OCR engine. Transcribe ALL text visible in the image.

Rules:
- Preserve the reading order a human would follow
- Keep paragraph breaks; do not reflow lines into one paragraph
- Do NOT describe the image, add commentary, or wrap the output in fences
- If the image contains no readable text, output nothing"#;
