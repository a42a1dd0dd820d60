use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{instrument, Span};

use docsum::{DocumentStatus, SummaryOptions};

use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct SummaryRequest {
    pub document_id: String,
    #[serde(default)]
    pub options: Option<SummaryOptions>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub document_id: String,
    pub status: DocumentStatus,
}

#[derive(Debug, Serialize)]
pub struct RegenerateResponse {
    pub document_id: String,
    pub summary: String,
}

/// Queues a summary. The caller polls `/documents/:id` for the outcome.
#[instrument(skip_all, fields(document_id))]
pub async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<SummaryRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<GenerateResponse>), ApiError> {
    let Json(request) = payload.map_err(rejection)?;
    Span::current().record("document_id", request.document_id.as_str());
    let status = state
        .service
        .generate(&request.document_id, request.options)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(GenerateResponse {
            document_id: request.document_id,
            status,
        }),
    ))
}

/// Summarises the stored text again and returns the summary inline.
#[instrument(skip_all, fields(document_id))]
pub async fn regenerate(
    State(state): State<AppState>,
    payload: Result<Json<SummaryRequest>, JsonRejection>,
) -> Result<Json<RegenerateResponse>, ApiError> {
    let Json(request) = payload.map_err(rejection)?;
    Span::current().record("document_id", request.document_id.as_str());
    let summary = state
        .service
        .regenerate(&request.document_id, request.options)
        .await?;

    Ok(Json(RegenerateResponse {
        document_id: request.document_id,
        summary,
    }))
}

fn rejection(err: JsonRejection) -> ApiError {
    ApiError::bad_request(err.body_text())
}
