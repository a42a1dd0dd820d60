use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use log::warn;
use serde::Serialize;
use tracing::instrument;

use docsum::DocumentSummary;

use crate::{pages, ApiError, AppState};

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub documents: Vec<DocumentSummary>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store: &'static str,
}

pub async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let documents = state.service.list().await?;
    Ok(Json(StatusResponse { documents }))
}

/// Result view. JSON when the client asks for it, HTML otherwise.
#[instrument(skip(state, headers))]
pub async fn document(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let record = state.service.get(&document_id).await?;

    if wants_json(&headers) {
        Ok(Json(record).into_response())
    } else {
        Ok(Html(pages::render_result(&record)).into_response())
    }
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = match state.service.store().ping().await {
        Ok(()) => "ok",
        Err(e) => {
            warn!("Store health check failed: {}", e);
            "unavailable"
        }
    };

    Json(HealthResponse {
        status: if store == "ok" { "ok" } else { "degraded" },
        store,
    })
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_wants_json() {
        let mut headers = HeaderMap::new();
        assert!(!wants_json(&headers));

        headers.insert(header::ACCEPT, HeaderValue::from_static("text/html,*/*"));
        assert!(!wants_json(&headers));

        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json, text/plain"),
        );
        assert!(wants_json(&headers));
    }
}
