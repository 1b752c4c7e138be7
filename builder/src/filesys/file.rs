//! File operations

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::errors::BuilderError;

/// A file wrapper with path
#[derive(Debug, Clone)]
pub struct File {
    path: PathBuf,
}

impl File {
    /// Create a new file reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the file exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    /// Read file as JSON
    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, BuilderError> {
        let contents = fs::read(&self.path).await?;
        let value = serde_json::from_slice(&contents)?;
        Ok(value)
    }

    /// Write JSON through a temporary file so readers never see a partial record
    pub async fn write_json_atomic<T: Serialize>(&self, value: &T) -> Result<(), BuilderError> {
        let contents = serde_json::to_vec_pretty(value)?;
        self.write_atomic(&contents).await
    }

    /// Atomic write through a uniquely named temporary file
    pub async fn write_atomic(&self, contents: &[u8]) -> Result<(), BuilderError> {
        self.ensure_parent().await?;
        let temp_path = self
            .path
            .with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }

    /// Create the parent directory chain
    pub async fn ensure_parent(&self) -> Result<(), BuilderError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Delete the file
    pub async fn delete(&self) -> Result<(), BuilderError> {
        if self.exists().await {
            fs::remove_file(&self.path).await?;
        }
        Ok(())
    }

    /// Change the owning uid/gid of the file.
    ///
    /// Always fails on non-Unix platforms.
    pub async fn chown(&self, uid: u32, gid: u32) -> Result<(), BuilderError> {
        #[cfg(unix)]
        {
            let path = self.path.clone();
            tokio::task::spawn_blocking(move || std::os::unix::fs::chown(&path, Some(uid), Some(gid)))
                .await
                .map_err(|e| BuilderError::Internal(e.to_string()))??;
            Ok(())
        }

        #[cfg(not(unix))]
        {
            let _ = (uid, gid);
            Err(BuilderError::Internal(
                "chown is not supported on this platform".to_string(),
            ))
        }
    }
}
