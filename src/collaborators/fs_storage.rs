use super::{Storage, StorageInfo};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Local filesystem storage. Relative paths resolve against `root`.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[async_trait]
impl Storage for FsStorage {
    async fn read_file(&self, path: &Path) -> Result<String> {
        let full = self.resolve(path);
        tokio::fs::read_to_string(&full)
            .await
            .with_context(|| format!("Failed to read {:?}", full))
    }

    async fn save_file(&self, path: &Path, content: &str) -> Result<()> {
        let full = self.resolve(path);

        // Ensure parent directory exists
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }

        tokio::fs::write(&full, content)
            .await
            .with_context(|| format!("Failed to write {:?}", full))
    }

    async fn info(&self) -> Result<StorageInfo> {
        let metadata = tokio::fs::metadata(&self.root)
            .await
            .with_context(|| format!("Storage root {:?} is not accessible", self.root))?;
        if !metadata.is_dir() {
            anyhow::bail!("Storage root {:?} is not a directory", self.root);
        }
        Ok(StorageInfo {
            backend: "filesystem".to_string(),
            root: Some(self.root.clone()),
        })
    }
}
