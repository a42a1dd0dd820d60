use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use log::{debug, info};
use serde::Serialize;
use tracing::instrument;

use docsum::error::format_size;
use docsum::extract::guess_content_type;
use docsum::{DocumentStatus, UploadedFile};

use crate::{ApiError, AppState};

const FILE_FIELD: &str = "file";
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub document_id: String,
    pub status: DocumentStatus,
}

#[instrument(skip_all)]
pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    // reject on the declared length before the body is read; the exact file
    // limit is enforced by the extractor
    if let Some(length) = content_length(&headers) {
        if length > state.max_request_bytes() {
            return Err(ApiError::payload_too_large(format!(
                "File too large ({} bytes, max {})",
                length,
                format_size(state.max_upload_bytes)
            )));
        }
    }

    let mut file = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field
            .content_type()
            .map(|ct| ct.to_string())
            .filter(|ct| !ct.is_empty())
            .or_else(|| guess_content_type(&filename))
            .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string());
        let bytes = field.bytes().await.map_err(multipart_error)?;

        debug!(
            "Received {} ({}, {} bytes)",
            filename,
            content_type,
            bytes.len()
        );
        file = Some(UploadedFile::new(filename, content_type, bytes.to_vec()));
        break;
    }

    let file = file.ok_or_else(|| ApiError::bad_request("No file uploaded"))?;
    let record = state.service.upload(file).await?;
    info!("Document {} created", record.document_id);

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            document_id: record.document_id,
            status: record.status,
        }),
    ))
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

fn multipart_error(err: MultipartError) -> ApiError {
    ApiError::new(err.status(), err.body_text())
}
