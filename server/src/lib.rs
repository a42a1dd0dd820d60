//! HTTP front end for docsum.

pub mod error;
pub mod pages;
pub mod routes;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use docsum::DocumentService;

pub use error::ApiError;

/// Room for multipart boundaries and part headers on top of the file itself.
pub const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DocumentService>,
    pub max_upload_bytes: u64,
}

impl AppState {
    pub fn new(service: Arc<DocumentService>, max_upload_bytes: u64) -> Self {
        Self {
            service,
            max_upload_bytes,
        }
    }

    /// Largest multipart request that can still carry a file within the limit.
    pub fn max_request_bytes(&self) -> u64 {
        self.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD)
    }
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.max_request_bytes()).unwrap_or(usize::MAX);

    Router::new()
        .route("/", get(routes::web::index))
        .route("/upload", post(routes::upload::upload))
        .route("/generate", post(routes::generate::generate))
        .route("/regenerate", post(routes::generate::regenerate))
        .route("/status", get(routes::status::status))
        .route("/documents/:document_id", get(routes::status::document))
        .route("/health", get(routes::status::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
