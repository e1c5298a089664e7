//! Multipart intake
//!
//! Streams each `files` part of a multipart body into its own temporary
//! file. Parts are never buffered whole in memory.

use std::io;
use std::path::Path;

use axum::extract::Multipart;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use super::types::{UploadError, UploadedItem, TEMP_FILE_PREFIX};

/// Collect the file parts named `field_name`, in stream order
///
/// Other fields are skipped. A part with an empty file name and no bytes is
/// what browsers send for an empty file input, and is not counted.
pub async fn collect_files(
    multipart: &mut Multipart,
    field_name: &str,
    temp_dir: Option<&Path>,
) -> Result<Vec<UploadedItem>, UploadError> {
    let mut items = Vec::new();
    let mut position = 0usize;

    while let Some(mut field) = multipart.next_field().await.map_err(|e| {
        tracing::error!("Failed to read multipart field: {}", e);
        UploadError::Parse(e.to_string())
    })? {
        let index = position;
        position += 1;

        if field.name() != Some(field_name) {
            tracing::debug!(index, name = ?field.name(), "Skipping non-file field");
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);

        let (temp, mut file) = open_spool_file(temp_dir).await?;

        let mut size = 0u64;
        while let Some(chunk) = field.chunk().await.map_err(|e| {
            tracing::error!("Failed to read file data: {}", e);
            UploadError::Parse(e.to_string())
        })? {
            file.write_all(&chunk).await.map_err(spool_error)?;
            size += chunk.len() as u64;
        }
        file.flush().await.map_err(spool_error)?;

        let unnamed = file_name.as_deref().map_or(true, str::is_empty);
        if size == 0 && unnamed {
            tracing::debug!(index, "Skipping empty file part");
            continue;
        }

        tracing::debug!(
            index,
            file_name = ?file_name,
            content_type = ?content_type,
            size,
            "Spooled file part"
        );

        items.push(UploadedItem::new(index, file_name, content_type, size, temp));
    }

    Ok(items)
}

/// Create a temp file and an async handle to it, off the async workers
async fn open_spool_file(
    temp_dir: Option<&Path>,
) -> Result<(NamedTempFile, tokio::fs::File), UploadError> {
    let temp_dir = temp_dir.map(Path::to_path_buf);

    let task = tokio::task::spawn_blocking(move || {
        let temp = create_temp_file(temp_dir.as_deref())?;
        let file = temp.reopen()?;
        Ok::<_, io::Error>((temp, file))
    });

    let (temp, file) = match task.await {
        Ok(result) => result.map_err(spool_error)?,
        Err(e) => return Err(spool_error(io::Error::other(e))),
    };

    Ok((temp, tokio::fs::File::from_std(file)))
}

fn create_temp_file(temp_dir: Option<&Path>) -> io::Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(TEMP_FILE_PREFIX);

    match temp_dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
}

fn spool_error(e: io::Error) -> UploadError {
    tracing::error!("Failed to spool upload: {}", e);
    UploadError::Spool(e)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::FromRequest;
    use axum::http::Request;

    use crate::test_support::{form_body, form_content_type, form_part as part};

    async fn multipart(parts: Vec<Vec<u8>>) -> Multipart {
        let request = Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header("content-type", form_content_type())
            .body(Body::from(form_body(parts)))
            .unwrap();

        Multipart::from_request(request, &()).await.unwrap()
    }

    #[tokio::test]
    async fn test_collects_file_parts_in_order() {
        let mut form = multipart(vec![
            part("files", Some("a.png"), Some("image/png"), b"first"),
            part("note", None, None, b"ignored"),
            part("files", Some("b.jpg"), Some("image/jpeg"), b"second!"),
        ])
        .await;

        let items = collect_files(&mut form, "files", None).await.unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].index, 0);
        assert_eq!(items[0].file_name.as_deref(), Some("a.png"));
        assert_eq!(items[0].content_type.as_deref(), Some("image/png"));
        assert_eq!(std::fs::read(items[0].path()).unwrap(), b"first");
        assert_eq!(items[1].index, 2);
        assert_eq!(items[1].size, 7);
        assert_eq!(std::fs::read(items[1].path()).unwrap(), b"second!");
    }

    #[tokio::test]
    async fn test_skips_empty_file_input() {
        let mut form = multipart(vec![part("files", Some(""), Some("application/octet-stream"), b"")]).await;

        let items = collect_files(&mut form, "files", None).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_spools_into_configured_dir_and_cleans_up() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut form = multipart(vec![part("files", Some("a.png"), Some("image/png"), b"data")]).await;

        let items = collect_files(&mut form, "files", Some(temp_dir.path())).await.unwrap();
        let path = items[0].path().to_path_buf();
        assert!(path.starts_with(temp_dir.path()));

        drop(items);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_unusable_temp_dir_is_spool_failure() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing");
        let mut form = multipart(vec![part("files", Some("a.png"), Some("image/png"), b"data")]).await;

        let result = collect_files(&mut form, "files", Some(missing.as_path())).await;

        let err = result.unwrap_err();
        assert!(matches!(err, UploadError::Spool(_)));
        assert_eq!(err.kind(), "spool_failed");
        assert_eq!(err.client_message(), "Error parsing form");
    }
}
