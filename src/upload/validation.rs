//! Content-type validation
//!
//! Filters uploaded items down to the images the assembler accepts,
//! keeping arrival order. Judged on the declared content type only.

use super::types::{
    content_type_essence, AcceptableImage, ImageKind, UploadedItem, ValidationError,
    DEFAULT_ALLOWED_CONTENT_TYPES,
};

/// Whitelist-based validator for uploaded items
#[derive(Debug, Clone)]
pub struct Validator {
    /// Allowed content type essences, lowercase
    allowed: Vec<String>,
}

impl Validator {
    /// Create a validator for the given content types
    ///
    /// Entries that do not name a format the assembler can place are dropped.
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = allowed
            .into_iter()
            .map(|content_type| content_type_essence(content_type.as_ref()))
            .filter(|essence| {
                let supported = ImageKind::from_content_type(essence).is_some();
                if !supported {
                    tracing::warn!(content_type = %essence, "Ignoring unsupported content type in whitelist");
                }
                supported
            })
            .collect();

        Self { allowed }
    }

    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }

    /// Classify a declared content type
    pub fn classify(&self, content_type: Option<&str>) -> Option<ImageKind> {
        let essence = content_type_essence(content_type?);
        if !self.allowed.iter().any(|allowed| *allowed == essence) {
            return None;
        }
        ImageKind::from_content_type(&essence)
    }

    /// Keep acceptable images in arrival order, drop everything else
    pub fn filter(
        &self,
        items: Vec<UploadedItem>,
    ) -> Result<Vec<AcceptableImage>, ValidationError> {
        let total = items.len();

        let accepted: Vec<AcceptableImage> = items
            .into_iter()
            .filter_map(|item| match self.classify(item.content_type.as_deref()) {
                Some(kind) => Some(AcceptableImage { kind, item }),
                None => {
                    tracing::debug!(
                        index = item.index,
                        content_type = ?item.content_type,
                        file_name = ?item.file_name,
                        "Rejected upload item"
                    );
                    None
                }
            })
            .collect();

        if accepted.is_empty() {
            return Err(ValidationError::NoAcceptableInput { rejected: total });
        }

        Ok(accepted)
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_CONTENT_TYPES)
    }
}

// ============================================================================
// Tests
// ============================================================================
