//! Text extraction from a registered source.
//!
//! Dispatch is on the lowercased file extension:
//!
//! | extension              | method                                   |
//! |------------------------|------------------------------------------|
//! | `pdf`                  | pdfium text layer, pages joined by `\n`  |
//! | `txt`, `md`, `markdown`| read as UTF-8                            |
//! | `png`, `jpg`, `jpeg`   | vision-model OCR through edgequake-llm   |
//!
//! Anything else is an input error. A scanned PDF with no text layer yields
//! an empty string, which the extract stage then rejects.

use super::input::resolve_source;
use super::postprocess::clean_llm_text;
use super::RetryPolicy;
use crate::capability::TextExtractor;
use crate::error::CapabilityError;
use crate::prompts::OCR_SYSTEM_PROMPT;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub struct FileTextExtractor {
    download_timeout_secs: u64,
    vision: Option<Arc<dyn LLMProvider>>,
    policy: RetryPolicy,
}

impl FileTextExtractor {
    /// `vision` is used for image sources; without it images are rejected.
    pub fn new(
        download_timeout_secs: u64,
        vision: Option<Arc<dyn LLMProvider>>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            download_timeout_secs,
            vision,
            policy,
        }
    }

    async fn ocr_image(&self, path: &Path) -> Result<String, CapabilityError> {
        let provider = self.vision.as_ref().ok_or_else(|| {
            CapabilityError::Input(format!(
                "no vision provider configured for image source {}",
                path.display()
            ))
        })?;

        let owned = path.to_path_buf();
        let image = tokio::task::spawn_blocking(move || encode_image(&owned))
            .await
            .map_err(|e| CapabilityError::Provider(format!("image decode task panicked: {e}")))??;

        let messages = vec![
            ChatMessage::system(OCR_SYSTEM_PROMPT),
            ChatMessage::user_with_images("", vec![image]),
        ];
        let options = CompletionOptions {
            temperature: Some(0.0),
            ..Default::default()
        };

        let (messages, options) = (&messages, &options);
        self.policy
            .run("ocr", || async move {
                let response = provider
                    .chat(messages, Some(options))
                    .await
                    .map_err(|e| CapabilityError::Provider(format!("ocr: {e}")))?;
                Ok(clean_llm_text(&response.content))
            })
            .await
    }
}

#[async_trait]
impl TextExtractor for FileTextExtractor {
    async fn extract(&self, source_path: &str) -> Result<String, CapabilityError> {
        let resolved = resolve_source(source_path, self.download_timeout_secs).await?;
        let path = resolved.path();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let text = match ext.as_str() {
            "pdf" => {
                let owned: PathBuf = path.to_path_buf();
                tokio::task::spawn_blocking(move || pdf_text(&owned))
                    .await
                    .map_err(|e| {
                        CapabilityError::Provider(format!("pdf extraction task panicked: {e}"))
                    })??
            }
            "txt" | "md" | "markdown" => read_utf8(path).await?,
            "png" | "jpg" | "jpeg" => self.ocr_image(path).await?,
            other => {
                return Err(CapabilityError::Input(format!(
                    "unsupported file type '{}' for {}",
                    if other.is_empty() { "<none>" } else { other },
                    path.display()
                )))
            }
        };

        info!("Extracted {} chars from {}", text.len(), source_path);
        Ok(text)
    }
}

async fn read_utf8(path: &Path) -> Result<String, CapabilityError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| CapabilityError::Input(format!("reading {}: {e}", path.display())))?;
    String::from_utf8(bytes)
        .map_err(|_| CapabilityError::Input(format!("{} is not valid UTF-8", path.display())))
}

/// Bind pdfium: `PDFIUM_LIB_PATH`, then the working directory, then the
/// system library.
fn bind_pdfium() -> Result<Pdfium, CapabilityError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(dir) if !dir.is_empty() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
        }
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| CapabilityError::Provider(format!("pdfium library unavailable: {e:?}")))?;
    Ok(Pdfium::new(bindings))
}

fn pdf_text(path: &Path) -> Result<String, CapabilityError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium.load_pdf_from_file(path, None).map_err(|e| {
        CapabilityError::Input(format!("cannot open PDF {}: {e:?}", path.display()))
    })?;

    let mut pages = Vec::new();
    for page in document.pages().iter() {
        let text = page
            .text()
            .map_err(|e| CapabilityError::Input(format!("reading PDF text: {e:?}")))?;
        pages.push(text.all());
    }
    debug!("PDF {}: {} pages", path.display(), pages.len());
    Ok(pages.join("\n"))
}

/// Decode an image file and re-encode it as a base64 PNG for the vision API.
fn encode_image(path: &Path) -> Result<ImageData, CapabilityError> {
    let img = image::open(path).map_err(|e| {
        CapabilityError::Input(format!("cannot decode image {}: {e}", path.display()))
    })?;
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| CapabilityError::Provider(format!("PNG encode: {e}")))?;
    Ok(ImageData::new(STANDARD.encode(&buf), "image/png").with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn extractor() -> FileTextExtractor {
        FileTextExtractor::new(
            5,
            None,
            RetryPolicy {
                max_retries: 0,
                backoff_ms: 1,
                timeout: Duration::from_secs(5),
            },
        )
    }

    #[tokio::test]
    async fn reads_plain_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a1.txt");
        std::fs::write(&path, "Hello world").unwrap();

        let text = extractor().extract(path.to_str().unwrap()).await.unwrap();
        assert_eq!(text, "Hello world");
    }

    #[tokio::test]
    async fn extension_match_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("NOTES.MD");
        std::fs::write(&path, "# Notes").unwrap();

        let text = extractor().extract(path.to_str().unwrap()).await.unwrap();
        assert_eq!(text, "# Notes");
    }

    #[tokio::test]
    async fn unsupported_extension_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sheet.xlsx");
        std::fs::write(&path, b"PK").unwrap();

        let err = extractor().extract(path.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, CapabilityError::Input(ref m) if m.contains("unsupported")), "{err:?}");
    }

    #[tokio::test]
    async fn invalid_utf8_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bin.txt");
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();

        let err = extractor().extract(path.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, CapabilityError::Input(_)));
    }

    #[tokio::test]
    async fn image_without_vision_provider_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        std::fs::write(&path, b"not really a png").unwrap();

        let err = extractor().extract(path.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, CapabilityError::Input(ref m) if m.contains("vision")), "{err:?}");
    }
}
