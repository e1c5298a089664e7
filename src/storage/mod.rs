//! Storage module for short-lived artifacts
//!
//! Backends: local filesystem directory or in-process memory.

mod backend;
mod ephemeral;
mod types;

pub use backend::{ArtifactStorage, LocalArtifactStorage, MemoryArtifactStorage};
pub use ephemeral::EphemeralStore;
pub use types::*;
