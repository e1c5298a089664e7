//! Route modules for PDF Drop Server

pub mod files;
pub mod health;
pub mod upload;

use axum::{extract::DefaultBodyLimit, routing::get, Router};

use crate::state::AppState;

/// Build the application router
///
/// Middleware that depends on deployment (CORS, request tracing) is layered
/// on by the binary.
pub fn app(state: AppState) -> Router {
    let max_upload_bytes = state.config().upload.max_upload_bytes;

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/health", get(health::health_check))
        .nest("/api", upload::router())
        .nest(files::ARTIFACT_ROUTE, files::router())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}
