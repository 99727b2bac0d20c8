//! Key-addressed blob storage used by the story library and the exporters.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Keys are `/`-separated relative names such as `"<id>/story.json"`.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn read(&self, key: &str) -> Result<Vec<u8>>;
    async fn write(&self, key: &str, content: &[u8]) -> Result<()>;
    /// Removes a blob or everything under a key prefix. Missing keys are fine.
    async fn delete(&self, key: &str) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
    /// Sorted names of the direct children of `prefix`; `""` lists the root.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Filesystem storage confined to one root directory.
pub struct NativeStorage {
    root: PathBuf,
}

impl NativeStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path for `key`. Keys may not step outside the root.
    pub fn resolve(&self, key: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for part in key.split('/').filter(|p| !p.is_empty()) {
            if part == "." || part == ".." || part.contains('\\') || Path::new(part).has_root() {
                bail!("Invalid storage key: {:?}", key);
            }
            path.push(part);
        }
        Ok(path)
    }
}

#[async_trait]
impl Storage for NativeStorage {
    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }

    async fn write(&self, key: &str, content: &[u8]) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        if path == self.root {
            bail!("Refusing to delete the storage root");
        }
        if !tokio::fs::try_exists(&path).await? {
            return Ok(());
        }
        if tokio::fs::metadata(&path).await?.is_dir() {
            tokio::fs::remove_dir_all(&path).await?;
        } else {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.resolve(key)?).await?)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let path = self.resolve(prefix)?;
        if !tokio::fs::try_exists(&path).await? || !tokio::fs::metadata(&path).await?.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        let mut dir = tokio::fs::read_dir(&path).await?;
        while let Some(entry) = dir.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names.sort();
        Ok(names)
    }
}
