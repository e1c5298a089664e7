//! Artifact storage backends
//!
//! A backend only knows how to write, read and remove bytes under an
//! identifier. Naming, uniqueness and retention live in `EphemeralStore`.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use super::types::{ArtifactId, StoreError};

// ============================================================================
// Storage Trait
// ============================================================================

/// Trait for artifact storage backends
#[async_trait::async_trait]
pub trait ArtifactStorage: Send + Sync {
    /// Write a new artifact. Never overwrites: an existing identifier
    /// yields `StoreError::Collision`.
    async fn write_new(&self, id: &ArtifactId, data: Bytes) -> Result<(), StoreError>;

    /// Read an artifact, `None` if absent
    async fn read(&self, id: &ArtifactId) -> Result<Option<Bytes>, StoreError>;

    /// Remove an artifact. Returns whether anything was removed.
    async fn remove(&self, id: &ArtifactId) -> Result<bool, StoreError>;

    /// Check whether an artifact is stored
    async fn exists(&self, id: &ArtifactId) -> bool;

    /// Remove every artifact the backend holds
    async fn purge(&self) -> Result<usize, StoreError>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}

// ============================================================================
// Local Filesystem Storage
// ============================================================================

/// Local filesystem artifact storage, one `{id}.pdf` file per artifact
pub struct LocalArtifactStorage {
    base_path: PathBuf,
}

impl LocalArtifactStorage {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn artifact_path(&self, id: &ArtifactId) -> PathBuf {
        self.base_path.join(id.file_name())
    }
}

#[async_trait::async_trait]
impl ArtifactStorage for LocalArtifactStorage {
    async fn write_new(&self, id: &ArtifactId, data: Bytes) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.base_path).await?;

        let path = self.artifact_path(id);
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::Collision(id.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let written = async {
            file.write_all(&data).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = written {
            // Never leave a truncated artifact behind
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e.into());
        }

        Ok(())
    }

    async fn read(&self, id: &ArtifactId) -> Result<Option<Bytes>, StoreError> {
        match tokio::fs::read(self.artifact_path(id)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, id: &ArtifactId) -> Result<bool, StoreError> {
        match tokio::fs::remove_file(self.artifact_path(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, id: &ArtifactId) -> bool {
        tokio::fs::try_exists(self.artifact_path(id))
            .await
            .unwrap_or(false)
    }

    async fn purge(&self) -> Result<usize, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.base_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut count = 0;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            // Only touch files this backend could have written
            let ours = file_name
                .to_str()
                .and_then(ArtifactId::from_file_name)
                .is_some();

            if ours {
                tokio::fs::remove_file(entry.path()).await?;
                count += 1;
            }
        }

        Ok(count)
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

// ============================================================================
// In-Memory Storage
// ============================================================================

/// In-memory artifact storage
#[derive(Default)]
pub struct MemoryArtifactStorage {
    artifacts: RwLock<HashMap<ArtifactId, Bytes>>,
}

impl MemoryArtifactStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ArtifactStorage for MemoryArtifactStorage {
    async fn write_new(&self, id: &ArtifactId, data: Bytes) -> Result<(), StoreError> {
        let mut artifacts = self.artifacts.write().await;
        if artifacts.contains_key(id) {
            return Err(StoreError::Collision(id.clone()));
        }
        artifacts.insert(id.clone(), data);
        Ok(())
    }

    async fn read(&self, id: &ArtifactId) -> Result<Option<Bytes>, StoreError> {
        let artifacts = self.artifacts.read().await;
        Ok(artifacts.get(id).cloned())
    }

    async fn remove(&self, id: &ArtifactId) -> Result<bool, StoreError> {
        let mut artifacts = self.artifacts.write().await;
        Ok(artifacts.remove(id).is_some())
    }

    async fn exists(&self, id: &ArtifactId) -> bool {
        let artifacts = self.artifacts.read().await;
        artifacts.contains_key(id)
    }

    async fn purge(&self) -> Result<usize, StoreError> {
        let mut artifacts = self.artifacts.write().await;
        let count = artifacts.len();
        artifacts.clear();
        Ok(count)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// ============================================================================
// Tests
// ============================================================================
