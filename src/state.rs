//! Application state management

use std::sync::Arc;

use crate::config::{Config, StorageBackend, StorageConfig};
use crate::pdf::Assembler;
use crate::storage::EphemeralStore;
use crate::upload::Validator;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    pub config: Config,
    pub store: EphemeralStore,
    pub validator: Validator,
    pub assembler: Assembler,
}

impl AppState {
    /// Create state around an existing store
    pub fn new(config: Config, store: EphemeralStore) -> Self {
        let validator = Validator::new(&config.upload.allowed_content_types);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                validator,
                assembler: Assembler::new(),
            }),
        }
    }

    /// Create state with the store the configuration asks for
    pub fn from_config(config: Config) -> Self {
        let store = build_store(&config.storage);
        Self::new(config, store)
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the artifact store
    pub fn store(&self) -> &EphemeralStore {
        &self.inner.store
    }

    pub fn validator(&self) -> &Validator {
        &self.inner.validator
    }

    pub fn assembler(&self) -> &Assembler {
        &self.inner.assembler
    }

    /// Cancel pending deletions and remove live artifacts
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down application state...");
        self.inner.store.shutdown().await;
    }
}

fn build_store(config: &StorageConfig) -> EphemeralStore {
    match config.backend {
        StorageBackend::Local => {
            EphemeralStore::with_local_storage(config.dir.clone(), config.retention)
        }
        StorageBackend::Memory => EphemeralStore::with_memory_storage(config.retention),
    }
}
