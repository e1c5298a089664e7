//! Ephemeral Artifact Store
//!
//! Stores assembled artifacts under fresh identifiers and deletes each one
//! once its retention window has elapsed:
//! - One deletion timer task per artifact, tracked in an id -> entry table
//! - Whoever removes the table entry (timer or explicit eviction) performs
//!   the deletion, so an artifact is deleted exactly once
//! - A failed deletion puts the entry back, unreadable, with a retry timer
//! - Reads are refused as soon as the deadline passes, even if the timer
//!   has not run yet

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use super::backend::{ArtifactStorage, LocalArtifactStorage, MemoryArtifactStorage};
use super::types::{ArtifactId, ArtifactMeta, StoreError};

/// Attempts at drawing an unused identifier before giving up
const MAX_ID_ATTEMPTS: usize = 4;

/// Timed deletion attempts per artifact before leaving it to eviction,
/// shutdown or the next startup purge
const MAX_DELETE_ATTEMPTS: u32 = 5;

/// Base delay between deletion attempts, multiplied by the attempt count
const DELETE_RETRY_DELAY: Duration = Duration::from_secs(1);

// ============================================================================
// Ephemeral Store
// ============================================================================

/// Artifact store with time-boxed retention
#[derive(Clone)]
pub struct EphemeralStore {
    inner: Arc<EphemeralStoreInner>,
}

struct EphemeralStoreInner {
    /// Storage backend
    backend: Box<dyn ArtifactStorage>,

    /// How long an artifact stays retrievable
    retention: Duration,

    /// Live artifacts and their armed deletion timers
    entries: Mutex<HashMap<ArtifactId, ArtifactEntry>>,
}

struct ArtifactEntry {
    meta: ArtifactMeta,
    deadline: Instant,
    timer: AbortHandle,
    /// Failed deletion attempts so far
    failed_deletes: u32,
}

impl EphemeralStore {
    /// Create with an arbitrary backend
    pub fn new(backend: Box<dyn ArtifactStorage>, retention: Duration) -> Self {
        Self {
            inner: Arc::new(EphemeralStoreInner {
                backend,
                retention,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Create with local filesystem storage
    pub fn with_local_storage(base_path: std::path::PathBuf, retention: Duration) -> Self {
        Self::new(Box::new(LocalArtifactStorage::new(base_path)), retention)
    }

    /// Create with in-memory storage
    pub fn with_memory_storage(retention: Duration) -> Self {
        Self::new(Box::new(MemoryArtifactStorage::new()), retention)
    }

    pub fn retention(&self) -> Duration {
        self.inner.retention
    }

    pub fn backend_name(&self) -> &'static str {
        self.inner.backend.name()
    }

    /// Store an artifact under a fresh identifier and arm its deletion
    pub async fn put(&self, data: impl Into<Bytes>) -> Result<ArtifactMeta, StoreError> {
        let data: Bytes = data.into();
        let retention = chrono::Duration::from_std(self.inner.retention)
            .map_err(|_| StoreError::InvalidRetention(self.inner.retention))?;

        let mut attempts = 0;
        let id = loop {
            attempts += 1;
            let candidate = ArtifactId::generate();
            match self.inner.backend.write_new(&candidate, data.clone()).await {
                Ok(()) => break candidate,
                Err(StoreError::Collision(id)) if attempts < MAX_ID_ATTEMPTS => {
                    tracing::warn!(artifact_id = %id, attempts, "Artifact id collision, drawing again");
                }
                Err(StoreError::Collision(_)) => return Err(StoreError::IdsExhausted(attempts)),
                Err(e) => return Err(e),
            }
        };

        let created_at = Utc::now();
        let meta = ArtifactMeta {
            id: id.clone(),
            size: data.len(),
            created_at,
            expires_at: created_at + retention,
        };
        let deadline = Instant::now() + self.inner.retention;

        {
            // Hold the table lock across spawn + insert so the timer can
            // never look for its entry before it exists
            let mut entries = self.inner.entries.lock();
            let timer = tokio::spawn(expire_at(
                Arc::downgrade(&self.inner),
                id.clone(),
                deadline,
            ));
            entries.insert(
                id.clone(),
                ArtifactEntry {
                    meta: meta.clone(),
                    deadline,
                    timer: timer.abort_handle(),
                    failed_deletes: 0,
                },
            );
        }

        tracing::info!(
            artifact_id = %id,
            size = meta.size,
            backend = self.inner.backend.name(),
            expires_at = %meta.expires_at,
            "Artifact stored"
        );

        Ok(meta)
    }

    /// Fetch an artifact's bytes, `None` once expired or if never stored
    pub async fn get(&self, id: &ArtifactId) -> Result<Option<Bytes>, StoreError> {
        if !self.is_live(id) {
            return Ok(None);
        }
        self.inner.backend.read(id).await
    }

    /// Metadata of a live artifact
    pub fn meta(&self, id: &ArtifactId) -> Option<ArtifactMeta> {
        let entries = self.inner.entries.lock();
        entries
            .get(id)
            .filter(|entry| Instant::now() < entry.deadline)
            .map(|entry| entry.meta.clone())
    }

    /// Delete an artifact ahead of its timer
    ///
    /// Returns whether this call deleted it. Evicting an unknown or already
    /// deleted identifier is a no-op. If the backend fails, the artifact
    /// stays tracked (no longer readable) and a later call can retry.
    pub async fn evict(&self, id: &ArtifactId) -> Result<bool, StoreError> {
        let entry = self.inner.entries.lock().remove(id);

        let Some(entry) = entry else {
            return Ok(false);
        };

        match self.inner.backend.remove(id).await {
            Ok(_) => {
                entry.timer.abort();
                tracing::info!(artifact_id = %id, "Artifact evicted");
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(artifact_id = %id, error = %e, "Failed to evict artifact");
                self.inner.reinstate(id.clone(), entry);
                Err(e)
            }
        }
    }

    /// Number of artifacts currently tracked, including any whose deletion
    /// is being retried
    pub fn live_count(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Whether the backend still holds bytes for this identifier
    pub async fn is_stored(&self, id: &ArtifactId) -> bool {
        self.inner.backend.exists(id).await
    }

    /// Remove artifacts left behind by a previous process
    ///
    /// Timers do not survive restarts, so anything in the backend at startup
    /// is unreachable.
    pub async fn purge_stale(&self) -> Result<usize, StoreError> {
        let count = self.inner.backend.purge().await?;
        if count > 0 {
            tracing::info!(count, backend = self.inner.backend.name(), "Purged stale artifacts");
        }
        Ok(count)
    }

    /// Cancel all timers and delete every live artifact
    pub async fn shutdown(&self) -> usize {
        let drained: Vec<(ArtifactId, ArtifactEntry)> =
            self.inner.entries.lock().drain().collect();

        let count = drained.len();
        for (id, entry) in drained {
            entry.timer.abort();
            if let Err(e) = self.inner.backend.remove(&id).await {
                tracing::warn!(artifact_id = %id, error = %e, "Failed to remove artifact on shutdown");
            }
        }

        if count > 0 {
            tracing::info!(count, "Removed live artifacts on shutdown");
        }
        count
    }

    fn is_live(&self, id: &ArtifactId) -> bool {
        let entries = self.inner.entries.lock();
        entries
            .get(id)
            .is_some_and(|entry| Instant::now() < entry.deadline)
    }
}

impl EphemeralStoreInner {
    /// Put back an entry whose deletion failed
    ///
    /// The entry becomes unreadable immediately. A retry timer is armed
    /// until `MAX_DELETE_ATTEMPTS` is reached; after that only eviction,
    /// shutdown or a startup purge remove it.
    fn reinstate(self: &Arc<Self>, id: ArtifactId, mut entry: ArtifactEntry) {
        entry.timer.abort();
        entry.failed_deletes += 1;
        entry.deadline = entry.deadline.min(Instant::now());

        let mut entries = self.entries.lock();
        if entry.failed_deletes < MAX_DELETE_ATTEMPTS {
            let retry_at = Instant::now() + DELETE_RETRY_DELAY * entry.failed_deletes;
            let timer = tokio::spawn(expire_at(Arc::downgrade(self), id.clone(), retry_at));
            entry.timer = timer.abort_handle();
        } else {
            tracing::error!(
                artifact_id = %id,
                attempts = entry.failed_deletes,
                "Giving up on timed deletion of artifact"
            );
        }
        entries.insert(id, entry);
    }
}

/// Deletion timer body for one artifact
async fn expire_at(store: Weak<EphemeralStoreInner>, id: ArtifactId, deadline: Instant) {
    tokio::time::sleep_until(deadline).await;

    // Store dropped: nothing left to clean up
    let Some(store) = store.upgrade() else {
        return;
    };

    // Lost the race against an eviction
    let Some(entry) = store.entries.lock().remove(&id) else {
        return;
    };

    match store.backend.remove(&id).await {
        Ok(_) => tracing::debug!(artifact_id = %id, "Artifact expired"),
        Err(e) => {
            tracing::warn!(
                artifact_id = %id,
                attempt = entry.failed_deletes + 1,
                error = %e,
                "Failed to delete expired artifact"
            );
            store.reinstate(id, entry);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
