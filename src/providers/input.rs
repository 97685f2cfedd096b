//! Source resolution: normalise a registered path or URL to a local file.
//!
//! URL sources are downloaded into a `TempDir` that lives as long as the
//! [`ResolvedInput`], so the file is removed once extraction is done.

use crate::error::CapabilityError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

pub enum ResolvedInput {
    Local(PathBuf),
    /// The `TempDir` is held to keep the download alive until dropped.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Resolve `source` to a readable local file.
///
/// A missing or unreadable local file is an input error; a failed download
/// is a provider error since the source may come back.
pub async fn resolve_source(
    source: &str,
    timeout_secs: u64,
) -> Result<ResolvedInput, CapabilityError> {
    if is_url(source) {
        download_url(source, timeout_secs).await
    } else {
        resolve_local(source)
    }
}

fn resolve_local(source: &str) -> Result<ResolvedInput, CapabilityError> {
    let path = PathBuf::from(source);

    if !path.is_file() {
        return Err(CapabilityError::Input(format!(
            "source file not found: {}",
            path.display()
        )));
    }

    match std::fs::File::open(&path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(CapabilityError::Input(format!(
                "permission denied: {}",
                path.display()
            )));
        }
        Err(e) => {
            return Err(CapabilityError::Input(format!(
                "cannot open {}: {e}",
                path.display()
            )));
        }
    }

    debug!("Resolved local source: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, CapabilityError> {
    info!("Downloading source from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| CapabilityError::Provider(format!("download client: {e}")))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            CapabilityError::Provider(format!("download of {url} timed out after {timeout_secs}s"))
        } else {
            CapabilityError::Provider(format!("download of {url} failed: {e}"))
        }
    })?;

    if !response.status().is_success() {
        return Err(CapabilityError::Provider(format!(
            "download of {url} failed: HTTP {}",
            response.status()
        )));
    }

    let filename = filename_from_url(url);
    let temp_dir = TempDir::new()
        .map_err(|e| CapabilityError::Provider(format!("creating temp dir: {e}")))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| CapabilityError::Provider(format!("download of {url} failed: {e}")))?;

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| CapabilityError::Provider(format!("writing temp file: {e}")))?;

    info!("Downloaded {} bytes to: {}", bytes.len(), file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Last path segment when it carries an extension, else `downloaded`.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded".to_string()
}
