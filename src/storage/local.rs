// SPDX-License-Identifier: GPL-3.0-only
use anyhow::Context;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use crate::storage::traits::BlobStore;

/// Blob store rooted at a local directory
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> anyhow::Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if path.trim().is_empty() || escapes {
            anyhow::bail!("blob path '{}' is not a plain relative path", path);
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> anyhow::Result<String> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        tokio::fs::write(&target, &bytes)
            .await
            .with_context(|| format!("writing {}", target.display()))?;

        debug!(path = %target.display(), bytes = bytes.len(), "Stored blob locally");
        Ok(target.display().to_string())
    }

    async fn get(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        let target = self.resolve(path)?;
        tokio::fs::read(&target)
            .await
            .with_context(|| format!("reading {}", target.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_then_get_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp_dir.path());

        let location = store.put("mirror/App.X/1.0/m.yaml", b"one".to_vec()).await.unwrap();
        store.put("mirror/App.X/1.0/m.yaml", b"two".to_vec()).await.unwrap();

        assert_eq!(
            PathBuf::from(&location),
            temp_dir.path().join("mirror").join("App.X").join("1.0").join("m.yaml")
        );
        assert_eq!(store.get("mirror/App.X/1.0/m.yaml").await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp_dir.path().join("root"));

        assert!(store.put("../outside.yaml", b"x".to_vec()).await.is_err());
        assert!(store.put("a/./b.yaml", b"x".to_vec()).await.is_ok());
        assert!(store.put("", b"x".to_vec()).await.is_err());
    }

    #[tokio::test]
    async fn test_get_missing_blob() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp_dir.path());
        assert!(store.get("nope/none.yaml").await.is_err());
    }
}
