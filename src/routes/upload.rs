//! Upload Routes
//!
//! Endpoints:
//! - POST /api/upload - Convert the `files` parts of a multipart form into one PDF

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use tracing::Instrument;
use uuid::Uuid;

use super::files::artifact_url;
use crate::state::AppState;
use crate::upload::{
    collect_files, MessageResponse, UploadError, UploadResponse, UploadStage, FILES_FIELD,
};

// ============================================================================
// Error Response
// ============================================================================

impl IntoResponse for UploadError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = Json(MessageResponse {
            message: self.client_message().to_string(),
        });

        (status, body).into_response()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Create the upload router
pub fn router() -> Router<AppState> {
    Router::new().route("/upload", post(upload))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/upload
///
/// Each request runs in its own span so concurrent uploads stay apart in
/// the logs.
async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, UploadError> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("upload", %request_id);

    async move {
        let result = convert(&state, multipart).await;

        match &result {
            Ok(response) => tracing::info!(
                stage = %UploadStage::Responded,
                pdf_url = %response.pdf_url,
                pages = response.pages,
                "PDF created"
            ),
            Err(e) if e.status_code().is_server_error() => tracing::error!(
                stage = %UploadStage::Responded,
                kind = e.kind(),
                error = %e,
                "Upload failed"
            ),
            Err(e) => tracing::warn!(
                stage = %UploadStage::Responded,
                kind = e.kind(),
                "Upload rejected"
            ),
        }

        result.map(Json)
    }
    .instrument(span)
    .await
}

/// Parse, validate, assemble and store
///
/// Spooled uploads are owned by this function and released on every return
/// path, success or failure.
async fn convert(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<UploadResponse, UploadError> {
    tracing::debug!(stage = %UploadStage::Received, "Upload received");

    let mut multipart = multipart.map_err(|e| UploadError::Parse(e.to_string()))?;
    let temp_dir = state.config().upload.temp_dir.as_deref();
    let items = collect_files(&mut multipart, FILES_FIELD, temp_dir).await?;

    if items.is_empty() {
        return Err(UploadError::NoFiles);
    }
    tracing::debug!(stage = %UploadStage::Parsed, files = items.len(), "Form parsed");

    let images = state.validator().filter(items)?;
    tracing::debug!(stage = %UploadStage::Validated, images = images.len(), "Inputs validated");

    let pdf = state.assembler().assemble(&images).await?;
    drop(images);
    tracing::debug!(
        stage = %UploadStage::Assembled,
        pages = pdf.pages,
        bytes = pdf.bytes.len(),
        "PDF assembled"
    );

    let pages = pdf.pages;
    let meta = state.store().put(pdf.bytes).await?;
    tracing::debug!(stage = %UploadStage::Stored, artifact = %meta.id, "PDF stored");

    Ok(UploadResponse {
        message: "PDF created".to_string(),
        pdf_url: artifact_url(&meta.id),
        pages,
        expires_at: meta.expires_at,
    })
}
