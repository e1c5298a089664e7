//! Upload types for the image-to-PDF pipeline

use std::fmt;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::pdf::AssemblyError;
use crate::storage::StoreError;

// ============================================================================
// Constants
// ============================================================================

/// Multipart field carrying the images
pub const FILES_FIELD: &str = "files";

/// Content types accepted when none are configured
pub const DEFAULT_ALLOWED_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/png"];

/// Default request body cap: 50MB
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Prefix for spooled upload files in the temp directory
pub const TEMP_FILE_PREFIX: &str = "pdfdrop-upload-";

// ============================================================================
// Image Kinds
// ============================================================================

/// Raster formats the assembler can place on a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    /// Map a content type essence (`type/subtype`, lowercase) to a kind
    pub fn from_content_type(essence: &str) -> Option<Self> {
        match essence {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(Self::Jpeg),
            "image/png" | "image/x-png" => Some(Self::Png),
            _ => None,
        }
    }

    pub fn image_format(self) -> image::ImageFormat {
        match self {
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
        }
    }
}

/// Lowercase `type/subtype` of a content type, parameters stripped
pub fn content_type_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

// ============================================================================
// Uploaded Items
// ============================================================================

/// One file part of a multipart upload, spooled to a temporary file
///
/// The temporary file is deleted when the item is dropped, whichever stage
/// of the pipeline drops it.
#[derive(Debug)]
pub struct UploadedItem {
    /// Position of the part in the multipart stream
    pub index: usize,

    /// Client-supplied file name
    pub file_name: Option<String>,

    /// Declared content type
    pub content_type: Option<String>,

    /// Bytes written to the temp file
    pub size: u64,

    file: NamedTempFile,
}

impl UploadedItem {
    pub fn new(
        index: usize,
        file_name: Option<String>,
        content_type: Option<String>,
        size: u64,
        file: NamedTempFile,
    ) -> Self {
        Self {
            index,
            file_name,
            content_type,
            size,
            file,
        }
    }

    /// Spool in-memory bytes to a temp file
    pub fn from_bytes(
        index: usize,
        content_type: Option<&str>,
        data: &[u8],
    ) -> std::io::Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix(TEMP_FILE_PREFIX)
            .tempfile()?;
        file.write_all(data)?;
        file.flush()?;

        Ok(Self::new(
            index,
            None,
            content_type.map(str::to_string),
            data.len() as u64,
            file,
        ))
    }

    /// Path of the backing temp file
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// An uploaded item whose declared content type passed validation
#[derive(Debug)]
pub struct AcceptableImage {
    pub kind: ImageKind,
    pub item: UploadedItem,
}

impl AcceptableImage {
    pub fn path(&self) -> &Path {
        self.item.path()
    }

    pub fn index(&self) -> usize {
        self.item.index
    }
}

// ============================================================================
// Pipeline Stages
// ============================================================================

/// Stages one upload request moves through, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    Received,
    Parsed,
    Validated,
    Assembled,
    Stored,
    Responded,
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Parsed => "parsed",
            Self::Validated => "validated",
            Self::Assembled => "assembled",
            Self::Stored => "stored",
            Self::Responded => "responded",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// Response after a PDF has been created
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: String,

    /// Path the PDF can be fetched from until it expires
    pub pdf_url: String,

    pub pages: usize,

    pub expires_at: DateTime<Utc>,
}

/// Error body, `{ "message": ... }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

// ============================================================================
// Error Types
// ============================================================================

/// Validation outcome when nothing usable was uploaded
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("No acceptable images ({rejected} rejected)")]
    NoAcceptableInput { rejected: usize },
}

/// Upload error types
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Error parsing form: {0}")]
    Parse(String),

    /// Writing an upload to temporary storage failed
    #[error("Failed to spool upload: {0}")]
    Spool(#[source] std::io::Error),

    #[error("No files uploaded")]
    NoFiles,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Error creating PDF: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("Error storing PDF: {0}")]
    Store(#[from] StoreError),
}

impl UploadError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::Parse(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Spool(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NoFiles => StatusCode::BAD_REQUEST,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Assembly(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message returned to the client
    pub fn client_message(&self) -> &'static str {
        match self {
            Self::Parse(_) | Self::Spool(_) => "Error parsing form",
            Self::NoFiles => "No files uploaded",
            Self::Validation(_) => "Only JPG and PNG files are allowed",
            Self::Assembly(_) | Self::Store(_) => "Error creating PDF",
        }
    }

    /// Short failure kind for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse(_) => "parse_error",
            Self::Spool(_) => "spool_failed",
            Self::NoFiles => "no_files",
            Self::Validation(_) => "no_acceptable_input",
            Self::Assembly(_) => "assembly_failed",
            Self::Store(_) => "store_error",
        }
    }
}
