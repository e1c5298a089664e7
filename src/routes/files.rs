//! Artifact serving routes
//!
//! Serves generated PDFs while they are live. Anything expired, evicted or
//! never issued is a plain 404.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
    routing::get,
    Router,
};

use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::storage::ArtifactId;

/// Path prefix artifacts are served under
pub const ARTIFACT_ROUTE: &str = "/pdfs";

/// Public URL path for an artifact
pub fn artifact_url(id: &ArtifactId) -> String {
    format!("{}/{}", ARTIFACT_ROUTE, id.file_name())
}

/// Create the files router
pub fn router() -> Router<AppState> {
    Router::new().route("/{file}", get(serve_artifact).delete(evict_artifact))
}

/// GET /pdfs/{id}.pdf
async fn serve_artifact(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> Result<Response> {
    let id = ArtifactId::from_file_name(&file).ok_or_else(|| AppError::NotFound(file.clone()))?;

    let data = state
        .store()
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(file.clone()))?;

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(header::CONTENT_LENGTH, data.len())
        .header(
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{}\"", id.file_name()),
        )
        .header(header::CACHE_CONTROL, "no-store");

    if let Some(meta) = state.store().meta(&id) {
        builder = builder.header(
            header::EXPIRES,
            meta.expires_at.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
        );
    }

    builder
        .body(Body::from(data))
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// DELETE /pdfs/{id}.pdf
///
/// Always 204: deleting something already gone is not an error.
async fn evict_artifact(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> Result<StatusCode> {
    if let Some(id) = ArtifactId::from_file_name(&file) {
        if state.store().evict(&id).await? {
            tracing::info!(artifact = %id, "Artifact evicted on request");
        }
    }
    Ok(StatusCode::NO_CONTENT)
}
