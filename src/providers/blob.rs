//! Filesystem blob store for generated media.

use crate::capability::BlobStore;
use crate::error::CapabilityError;
use crate::record::BlobRef;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Writes blobs under a root directory (`<root>/audio/<id>.mp3`,
/// `<root>/images/<id>.png`). The returned [`BlobRef`] is the file path.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, CapabilityError> {
        let rel = Path::new(key);
        let safe = !key.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(CapabilityError::Input(format!("invalid blob key '{key}'")));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<BlobRef, CapabilityError> {
        let path = self.resolve(key)?;
        let write_err =
            |e: std::io::Error| CapabilityError::Provider(format!("writing '{}': {e}", path.display()));

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        // Atomic write: temp file, then rename over any previous blob.
        let mut tmp_name = path.clone().into_os_string();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        tokio::fs::write(&tmp_path, bytes).await.map_err(write_err)?;
        tokio::fs::rename(&tmp_path, &path).await.map_err(write_err)?;

        debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(BlobRef::new(path.to_string_lossy()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_writes_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        let first = store.put("audio/doc1.mp3", b"one").await.unwrap();
        let second = store.put("audio/doc1.mp3", b"two").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(std::fs::read(second.as_str()).unwrap(), b"two");
        assert!(!dir.path().join("audio/doc1.mp3.tmp").exists());
    }

    #[tokio::test]
    async fn rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        for key in ["../x.png", "/abs.png", ""] {
            assert!(
                matches!(store.put(key, b"x").await, Err(CapabilityError::Input(_))),
                "{key}"
            );
        }
    }
}
