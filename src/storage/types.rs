//! Storage types

use std::fmt;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Number of random bytes behind an artifact identifier (128 bits)
pub const ARTIFACT_ID_BYTES: usize = 16;

/// File extension used for stored artifacts
pub const ARTIFACT_EXTENSION: &str = "pdf";

/// Unguessable artifact identifier
///
/// Drawn from the thread-local CSPRNG and hex encoded, so identifiers are
/// always 32 lowercase hex characters and safe to use as file names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(String);

impl ArtifactId {
    /// Generate a fresh identifier
    pub fn generate() -> Self {
        let mut bytes = [0u8; ARTIFACT_ID_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Parse an identifier received from a client
    ///
    /// Anything that is not exactly 32 lowercase hex characters is rejected,
    /// which keeps path separators and dots out of storage keys.
    pub fn parse(value: &str) -> Option<Self> {
        let valid = value.len() == ARTIFACT_ID_BYTES * 2
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));

        valid.then(|| Self(value.to_string()))
    }

    /// Parse a `{id}.pdf` file name
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        file_name
            .strip_suffix(ARTIFACT_EXTENSION)
            .and_then(|stem| stem.strip_suffix('.'))
            .and_then(Self::parse)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name the artifact is stored and served under
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.0, ARTIFACT_EXTENSION)
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata about a stored artifact
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMeta {
    pub id: ArtifactId,
    pub size: usize,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An artifact with this identifier already exists
    #[error("Artifact already exists: {0}")]
    Collision(ArtifactId),

    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Retention window out of range: {0:?}")]
    InvalidRetention(std::time::Duration),

    #[error("Could not allocate a unique artifact id after {0} attempts")]
    IdsExhausted(usize),
}
